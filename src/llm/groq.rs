use super::{ChatProvider, CompletionRequest, LlmError, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Adapter for Groq's OpenAI-compatible chat completions endpoint.
pub struct GroqClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GroqClient {
    /// Construct a client against `base_url` (for example `https://api.groq.com/openai/v1`).
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent("mediarelay/groq").build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatProvider for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let prompting = request.prompting;
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: prompting.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &request.text,
                },
            ],
            temperature: prompting.temperature(),
            max_tokens: prompting.max_tokens(),
        };

        let mut builder = self.http.post(self.endpoint()).timeout(self.timeout);
        // Without a key the request still goes out and Groq's 401 is reported as a status error.
        if let Some(api_key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::from_transport(Provider::Groq, self.timeout, error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: Provider::Groq,
                status,
                body,
            });
        }

        let payload: ChatResponse =
            response
                .json()
                .await
                .map_err(|error| LlmError::InvalidResponse {
                    provider: Provider::Groq,
                    message: error.to_string(),
                })?;

        Ok(payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| prompting.fallback_reply().to_string()))
    }
}
