//! Upload and voice pipelines.
//!
//! [`MediaPipeline`] owns long-lived handles to every collaborator client so both HTTP
//! surfaces share them. Construct it once near process start and share it through an `Arc`.

pub mod types;
mod upload;
mod voice;

pub use types::{FileReport, PipelineError, UploadedFile, VoiceReply};
pub use upload::AI_FAILURE_SENTINEL;

use crate::config::{Config, UploadRetention};
use crate::extraction::Extractor;
use crate::llm::LanguageModelClient;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::session::SessionStore;
use crate::transcription::TranscriptionClient;
use async_trait::async_trait;
use std::sync::Arc;

/// Abstraction over the pipelines used by the HTTP surface.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Extract and query every file concurrently; reports keep upload order.
    async fn process_batch(
        &self,
        files: Vec<UploadedFile>,
        selector: &str,
    ) -> Result<Vec<FileReport>, PipelineError>;

    /// Transcribe a voice note, answer it, and append both turns to the session.
    async fn process_voice(
        &self,
        session_id: &str,
        file: UploadedFile,
        selector: &str,
    ) -> Result<VoiceReply, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Production implementation of [`PipelineApi`].
pub struct MediaPipeline {
    extractor: Extractor,
    llm: LanguageModelClient,
    transcription: TranscriptionClient,
    sessions: Arc<dyn SessionStore>,
    metrics: Arc<PipelineMetrics>,
    public_upload_prefix: String,
    batch_retention: UploadRetention,
    voice_retention: UploadRetention,
}

impl MediaPipeline {
    /// Build every collaborator client from configuration.
    pub fn new(config: &Config, sessions: Arc<dyn SessionStore>) -> Result<Self, reqwest::Error> {
        tracing::info!("Initializing collaborator clients");
        Ok(Self {
            extractor: Extractor::new(config)?,
            llm: LanguageModelClient::new(config)?,
            transcription: TranscriptionClient::new(config)?,
            sessions,
            metrics: Arc::new(PipelineMetrics::new()),
            public_upload_prefix: config.public_upload_prefix.clone(),
            batch_retention: config.batch_retention,
            voice_retention: config.voice_retention,
        })
    }
}

#[async_trait]
impl PipelineApi for MediaPipeline {
    async fn process_batch(
        &self,
        files: Vec<UploadedFile>,
        selector: &str,
    ) -> Result<Vec<FileReport>, PipelineError> {
        let paths: Vec<_> = files.iter().map(|file| file.path.clone()).collect();
        let outcome = self.run_batch(files, selector).await;
        for path in &paths {
            release_upload(path, self.batch_retention).await;
        }
        outcome
    }

    async fn process_voice(
        &self,
        session_id: &str,
        file: UploadedFile,
        selector: &str,
    ) -> Result<VoiceReply, PipelineError> {
        let path = file.path.clone();
        let outcome = self.run_voice(session_id, file, selector).await;
        release_upload(&path, self.voice_retention).await;
        outcome
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Apply a retention policy to a finished upload. Runs once per file per invocation.
pub(crate) async fn release_upload(path: &std::path::Path, retention: UploadRetention) {
    if retention == UploadRetention::Keep {
        return;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed upload"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "Failed to remove upload")
        }
    }
}
