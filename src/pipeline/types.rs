//! Data carried through the upload and voice pipelines.

use crate::extraction::ExtractionError;
use crate::llm::LlmError;
use crate::session::SessionStoreError;
use crate::transcription::TranscriptionError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A multipart file persisted to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Location on disk.
    pub path: PathBuf,
    /// File name inside the upload directory.
    pub stored_name: String,
    /// Name supplied by the client.
    pub original_name: String,
    /// MIME type declared by the client.
    pub media_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// Per-file result of the batch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Stored file name.
    pub filename: String,
    /// Client-supplied file name.
    pub originalname: String,
    /// Declared MIME type.
    pub mimetype: String,
    /// Size in bytes.
    pub size: u64,
    /// Public URL of the retained upload.
    pub url: String,
    /// Extracted text or failure sentinel.
    pub content: Option<String>,
    /// Provider reply or failure sentinel.
    pub ai_response: Option<String>,
}

/// Result of a completed voice exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceReply {
    /// Transcript of the uploaded audio.
    pub transcription: String,
    /// Assistant reply appended to the session.
    pub reply: String,
    /// Selector the caller asked for.
    pub model_used: String,
}

/// Errors that end a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A document extractor failed; the whole batch is abandoned.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    /// The transcription service failed.
    #[error("{0}")]
    Transcription(#[from] TranscriptionError),
    /// The audio contained no recognizable speech.
    #[error("No speech detected in audio")]
    EmptyTranscript,
    /// The session does not exist.
    #[error("Session not found")]
    SessionNotFound(String),
    /// The provider selector named neither provider.
    #[error("Unknown model selected")]
    UnknownProvider(String),
    /// The language-model call failed.
    #[error("{0}")]
    Llm(LlmError),
    /// Loading or saving the session failed.
    #[error("{0}")]
    Session(#[from] SessionStoreError),
}

impl From<LlmError> for PipelineError {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::UnknownProvider(selector) => Self::UnknownProvider(selector),
            other => Self::Llm(other),
        }
    }
}

impl PipelineError {
    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyTranscript | Self::SessionNotFound(_) | Self::UnknownProvider(_)
        )
    }
}
