//! Client for the local speech transcription microservice used by voice sessions.

use crate::config::Config;
use crate::pipeline::UploadedFile;
use reqwest::{Client, StatusCode, multipart};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while transcribing a voice upload.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Reading the stored upload failed.
    #[error("Failed to read audio upload: {0}")]
    Io(#[from] std::io::Error),
    /// Transport failure before a response arrived.
    #[error("Transcription request failed: {0}")]
    Http(#[source] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("Transcription service returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned.
        status: StatusCode,
        /// Response body returned with the status.
        body: String,
    },
    /// The service did not answer within the bound.
    #[error("Transcription service did not respond within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    transcript: Option<String>,
}

/// Sends audio to the transcription service as multipart field `audio`.
pub struct TranscriptionClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl TranscriptionClient {
    /// Build a client from configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent("mediarelay/transcription")
            .build()?;
        Ok(Self {
            http,
            endpoint: config.transcription_url.clone(),
            timeout: config.voice_transcription_timeout,
        })
    }

    /// Transcribe a stored audio upload. A missing transcript field yields an empty string.
    pub async fn transcribe(&self, file: &UploadedFile) -> Result<String, TranscriptionError> {
        let bytes = tokio::fs::read(&file.path).await?;
        let part = multipart::Part::bytes(bytes)
            .file_name(file.stored_name.clone())
            .mime_str(&file.media_type)
            .map_err(TranscriptionError::Http)?;
        let form = multipart::Form::new().part("audio", part);

        tracing::debug!(file = %file.stored_name, endpoint = %self.endpoint, "Sending audio for transcription");
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|error| self.classify(error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::UnexpectedStatus { status, body });
        }

        let payload: TranscriptionResponse =
            response.json().await.map_err(|error| self.classify(error))?;
        Ok(payload.transcript.unwrap_or_default())
    }

    fn classify(&self, error: reqwest::Error) -> TranscriptionError {
        if error.is_timeout() {
            TranscriptionError::Timeout(self.timeout)
        } else {
            TranscriptionError::Http(error)
        }
    }
}
