use super::ExtractionError;
use crate::pipeline::UploadedFile;
use reqwest::{Client, multipart};
use serde::Deserialize;
use std::time::Duration;

/// HTTP client for the OCR microservice.
pub struct OcrClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
}

impl OcrClient {
    /// Construct a client posting to `endpoint`, bounded by `timeout` per call.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent("mediarelay/ocr").build()?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    /// Send the raw image bytes as multipart field `image` and return the recognized text.
    pub async fn recognize(&self, file: &UploadedFile) -> Result<Option<String>, ExtractionError> {
        let bytes = tokio::fs::read(&file.path).await?;
        let part = multipart::Part::bytes(bytes)
            .file_name(file.stored_name.clone())
            .mime_str(&file.media_type)
            .map_err(|error| ExtractionError::Ocr(format!("invalid media type: {error}")))?;
        let form = multipart::Form::new().part("image", part);

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
            return Err(ExtractionError::Ocr(format!("{status}: {body}")));
        }

        let payload: OcrResponse = response.json().await.map_err(|error| self.classify(error))?;
        tracing::debug!(
            file = %file.stored_name,
            chars = payload.text.as_deref().map(str::len).unwrap_or(0),
            "OCR completed"
        );
        Ok(payload.text)
    }

    fn classify(&self, error: reqwest::Error) -> ExtractionError {
        if error.is_timeout() {
            ExtractionError::Timeout {
                collaborator: "OCR microservice",
                after: self.timeout,
            }
        } else {
            ExtractionError::Ocr(error.to_string())
        }
    }
}
