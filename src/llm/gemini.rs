use super::{ChatProvider, CompletionRequest, LlmError, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Adapter for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiClient {
    /// Construct a client. A missing key is reported when the client is used.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent("mediarelay/gemini").build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            timeout,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if any.
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey("GEMINI_API_KEY"))?;
        let prompting = request.prompting;
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompting.gemini_prompt(&request.text),
                }],
            }],
            generation_config: prompting.tunes_gemini().then(|| GenerationConfig {
                temperature: prompting.temperature(),
                max_output_tokens: prompting.max_tokens(),
            }),
        };

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::from_transport(Provider::Gemini, self.timeout, error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: Provider::Gemini,
                status,
                body,
            });
        }

        let payload: GenerateResponse =
            response
                .json()
                .await
                .map_err(|error| LlmError::InvalidResponse {
                    provider: Provider::Gemini,
                    message: error.to_string(),
                })?;

        Ok(payload
            .into_text()
            .unwrap_or_else(|| prompting.fallback_reply().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Prompting;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(base_url: String, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(base_url, api_key.map(str::to_string), Duration::from_secs(5))
            .expect("client")
    }

    fn request(prompting: Prompting) -> CompletionRequest {
        CompletionRequest {
            model: "gemini-1.5-flash".into(),
            text: "The quick brown fox".into(),
            prompting,
        }
    }

    #[tokio::test]
    async fn wraps_text_in_document_preamble() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-1.5-flash:generateContent")
                    .header("x-goog-api-key", "secret")
                    .body_contains("help the user understand or summarize it")
                    .body_contains("The quick brown fox");
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "A fox story." }] } }]
                }));
            })
            .await;

        let reply = client(server.base_url(), Some("secret"))
            .complete(&request(Prompting::Document))
            .await
            .expect("reply");

        mock.assert_async().await;
        assert_eq!(reply, "A fox story.");
    }

    #[tokio::test]
    async fn empty_candidates_use_fallback() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let reply = client(server.base_url(), Some("secret"))
            .complete(&request(Prompting::Conversation))
            .await
            .expect("reply");

        assert_eq!(reply, "Sorry, I could not generate a response.");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        let error = client(server.base_url(), None)
            .complete(&request(Prompting::Document))
            .await
            .expect_err("missing key");

        assert!(matches!(error, LlmError::MissingApiKey("GEMINI_API_KEY")));
        mock.assert_hits_async(0).await;
    }
}
