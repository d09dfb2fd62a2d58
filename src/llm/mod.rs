//! Language-model client: provider selection and normalized replies.
//!
//! Two hosted providers are supported. Gemini receives a single prompt built from a fixed
//! preamble; Groq receives an OpenAI-style chat completion with a system and a user message.
//! Both replies are reduced to plain text, with a fixed fallback when the provider answers
//! without content.

mod gemini;
mod groq;

pub use gemini::GeminiClient;
pub use groq::GroqClient;

use crate::config::Config;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Extracted text must be longer than this many characters to be sent to a provider.
pub const MIN_TEXT_CHARS: usize = 10;

/// Errors surfaced by the language-model client.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider's API key is not configured.
    #[error("{0} is not set in environment variables")]
    MissingApiKey(&'static str),
    /// A strict selector named neither provider.
    #[error("Unknown model selected: {0}")]
    UnknownProvider(String),
    /// Transport failure before a response arrived.
    #[error("{provider} request failed: {source}")]
    Http {
        /// Provider being called.
        provider: Provider,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The provider answered with a non-success status.
    #[error("{provider} API error: {status} - {body}")]
    Status {
        /// Provider being called.
        provider: Provider,
        /// HTTP status returned.
        status: StatusCode,
        /// Response body returned with the status.
        body: String,
    },
    /// The provider's success body could not be decoded.
    #[error("Malformed {provider} response: {message}")]
    InvalidResponse {
        /// Provider being called.
        provider: Provider,
        /// Decoder message.
        message: String,
    },
    /// The provider did not answer within the configured bound.
    #[error("{provider} did not respond within {after:?}")]
    Timeout {
        /// Provider being called.
        provider: Provider,
        /// Bound that elapsed.
        after: Duration,
    },
}

impl LlmError {
    pub(crate) fn from_transport(
        provider: Provider,
        timeout: Duration,
        source: reqwest::Error,
    ) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                provider,
                after: timeout,
            }
        } else {
            Self::Http { provider, source }
        }
    }
}

/// Hosted language-model providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini (provider A).
    Gemini,
    /// Groq chat completions (provider B).
    Groq,
}

impl Provider {
    /// Lower-case selector naming this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Groq => "groq",
        }
    }

    /// Model used when the selector only names the provider.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::Groq => "llama3-8b-8192",
        }
    }

    /// Concrete model for a selector: the selector itself unless it is the bare provider name.
    pub fn resolve_model(self, selector: &str) -> String {
        let selector = selector.trim();
        if selector.is_empty() || selector.eq_ignore_ascii_case(self.as_str()) {
            self.default_model().to_string()
        } else {
            selector.to_string()
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gemini => "Gemini",
            Self::Groq => "Groq",
        })
    }
}

/// How a selector string is mapped onto a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Case-insensitive prefix match; unrecognized selectors select nothing.
    Prefix,
    /// Case-insensitive equality with `gemini` or `groq`; anything else is rejected.
    Exact,
}

impl SelectionStrategy {
    /// Resolve `selector` to a provider.
    ///
    /// `Ok(None)` means "no provider, no reply" and is only produced by [`Self::Prefix`].
    pub fn select(self, selector: &str) -> Result<Option<Provider>, LlmError> {
        let normalized = selector.trim().to_lowercase();
        let matches = |provider: Provider| match self {
            Self::Prefix => normalized.starts_with(provider.as_str()),
            Self::Exact => normalized == provider.as_str(),
        };
        let chosen = [Provider::Gemini, Provider::Groq]
            .into_iter()
            .find(|provider| matches(*provider));
        match (self, chosen) {
            (Self::Exact, None) => Err(LlmError::UnknownProvider(selector.to_string())),
            (_, chosen) => Ok(chosen),
        }
    }
}

/// Prompt profile for a call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompting {
    /// Help the user understand text extracted from an uploaded file.
    Document,
    /// Answer a transcribed voice message conversationally.
    Conversation,
}

impl Prompting {
    /// Single-turn prompt sent to Gemini.
    pub fn gemini_prompt(self, text: &str) -> String {
        match self {
            Self::Document => format!(
                "You are a helpful assistant. Given the following extracted text, help the user understand or summarize it:\n\n\"{text}\""
            ),
            Self::Conversation => format!(
                "You are a helpful AI assistant. The user sent this voice message:\n\nUser's message: \"{text}\"\n\nRespond as if you are having a natural conversation."
            ),
        }
    }

    /// System message sent to Groq.
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Document => "You are a helpful assistant analyzing extracted document text.",
            Self::Conversation => {
                "You are a helpful AI assistant. Respond naturally to the user message."
            }
        }
    }

    /// Sampling temperature.
    pub fn temperature(self) -> f32 {
        0.7
    }

    /// Completion token ceiling.
    pub fn max_tokens(self) -> u32 {
        match self {
            Self::Document => 800,
            Self::Conversation => 1000,
        }
    }

    /// Whether Gemini receives an explicit generation config.
    pub fn tunes_gemini(self) -> bool {
        matches!(self, Self::Conversation)
    }

    /// Reply used when the provider answers without text.
    pub fn fallback_reply(self) -> &'static str {
        match self {
            Self::Document => "Sorry, no reply generated.",
            Self::Conversation => "Sorry, I could not generate a response.",
        }
    }
}

/// A fully resolved request to one provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Concrete model identifier.
    pub model: String,
    /// Text to send.
    pub text: String,
    /// Prompt profile.
    pub prompting: Prompting,
}

/// Interface implemented by provider adapters.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Produce a reply, substituting the profile's fallback when the provider returns no text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Whether `text` is substantial enough to be worth a provider call.
pub fn worth_querying(text: Option<&str>) -> bool {
    text.is_some_and(|text| text.chars().count() > MIN_TEXT_CHARS)
}

/// Routes extracted text to the selected provider.
pub struct LanguageModelClient {
    gemini: Box<dyn ChatProvider>,
    groq: Box<dyn ChatProvider>,
}

impl LanguageModelClient {
    /// Build both provider adapters from explicit configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::with_providers(
            Box::new(GeminiClient::new(
                config.gemini_base_url.clone(),
                config.gemini_api_key.clone(),
                config.collaborator_timeout,
            )?),
            Box::new(GroqClient::new(
                config.groq_base_url.clone(),
                config.groq_api_key.clone(),
                config.collaborator_timeout,
            )?),
        ))
    }

    /// Assemble a client from arbitrary adapters.
    pub fn with_providers(gemini: Box<dyn ChatProvider>, groq: Box<dyn ChatProvider>) -> Self {
        Self { gemini, groq }
    }

    /// Ask the provider chosen by `selector` about `text`.
    ///
    /// Returns `Ok(None)` when a lenient strategy recognizes no provider.
    pub async fn ask(
        &self,
        text: &str,
        selector: &str,
        strategy: SelectionStrategy,
        prompting: Prompting,
    ) -> Result<Option<String>, LlmError> {
        let Some(provider) = strategy.select(selector)? else {
            tracing::debug!(selector, "No provider matches selector; skipping model call");
            return Ok(None);
        };
        let request = CompletionRequest {
            model: provider.resolve_model(selector),
            text: text.to_string(),
            prompting,
        };
        tracing::info!(%provider, model = %request.model, chars = text.len(), "Querying language model");
        let adapter = match provider {
            Provider::Gemini => &self.gemini,
            Provider::Groq => &self.groq,
        };
        adapter.complete(&request).await.map(Some)
    }
}
