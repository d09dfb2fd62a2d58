use super::{FileReport, MediaPipeline, PipelineError, UploadedFile};
use crate::llm::{Prompting, SelectionStrategy, worth_querying};
use futures_util::future::try_join_all;

/// Reply substituted when the language-model call for one file fails.
pub const AI_FAILURE_SENTINEL: &str = "⚠️ AI processing failed.";

impl MediaPipeline {
    /// Fan out one task per file and join on all of them.
    ///
    /// A document extraction error aborts the join; OCR, caption and provider failures are
    /// absorbed per file.
    pub(super) async fn run_batch(
        &self,
        files: Vec<UploadedFile>,
        selector: &str,
    ) -> Result<Vec<FileReport>, PipelineError> {
        tracing::info!(files = files.len(), selector, "Processing upload batch");
        let reports = try_join_all(files.iter().map(|file| self.report_file(file, selector))).await?;
        tracing::info!(files = reports.len(), "Upload batch processed");
        Ok(reports)
    }

    async fn report_file(
        &self,
        file: &UploadedFile,
        selector: &str,
    ) -> Result<FileReport, PipelineError> {
        let extraction = self.extractor.extract(file).await.map_err(|error| {
            tracing::error!(file = %file.stored_name, error = %error, "Extraction failed");
            error
        })?;

        let ai_response = match extraction.text.as_deref() {
            Some(text) if worth_querying(Some(text)) => {
                self.ask_about(file, text, selector).await
            }
            _ => None,
        };

        self.metrics.record_file(extraction.degraded);
        Ok(FileReport {
            filename: file.stored_name.clone(),
            originalname: file.original_name.clone(),
            mimetype: file.media_type.clone(),
            size: file.size,
            url: format!("{}/{}", self.public_upload_prefix, file.stored_name),
            content: extraction.text,
            ai_response,
        })
    }

    async fn ask_about(&self, file: &UploadedFile, text: &str, selector: &str) -> Option<String> {
        match self
            .llm
            .ask(text, selector, SelectionStrategy::Prefix, Prompting::Document)
            .await
        {
            Ok(reply) => {
                if reply.is_some() {
                    self.metrics.record_provider_call(true);
                }
                reply
            }
            Err(error) => {
                tracing::error!(file = %file.stored_name, error = %error, "AI processing failed");
                self.metrics.record_provider_call(false);
                Some(AI_FAILURE_SENTINEL.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadRetention;
    use crate::extraction::{ExtractionError, OCR_FAILURE_SENTINEL};
    use crate::pipeline::PipelineApi;
    use crate::pipeline::test_support::{config_for, stored};
    use crate::session::InMemorySessionStore;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::sync::Arc;

    fn pipeline(server: &MockServer) -> MediaPipeline {
        MediaPipeline::new(
            &config_for(&server.base_url()),
            Arc::new(InMemorySessionStore::new()),
        )
        .expect("pipeline")
    }

    #[tokio::test]
    async fn ocr_failure_degrades_only_that_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ocr");
                then.status(503).body("ocr down");
            })
            .await;
        let groq = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "Here is a summary." } }]
                }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let files = vec![
            stored(dir.path(), "a.txt", "text/plain", b"A long enough plain text body."),
            stored(dir.path(), "b.png", "image/png", b"png"),
            stored(dir.path(), "c.txt", "text/plain", b"short"),
        ];

        let reports = pipeline(&server)
            .process_batch(files, "groq")
            .await
            .expect("batch succeeds");

        let names: Vec<_> = reports.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.png", "c.txt"]);
        assert_eq!(reports[0].ai_response.as_deref(), Some("Here is a summary."));
        assert_eq!(reports[1].content.as_deref(), Some(OCR_FAILURE_SENTINEL));
        assert_eq!(reports[1].url, "/uploads/b.png");
        assert_eq!(reports[2].content.as_deref(), Some("short"));
        assert_eq!(reports[2].ai_response, None);
        // The sentinel is content too, so it is still sent to the provider.
        groq.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn document_extraction_error_fails_whole_batch() {
        let server = MockServer::start_async().await;
        let groq = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let files = vec![
            stored(dir.path(), "fine.txt", "text/plain", b"Perfectly readable text."),
            stored(dir.path(), "broken.pdf", "application/pdf", b"%PDF-garbage"),
        ];

        let error = pipeline(&server)
            .process_batch(files, "groq")
            .await
            .expect_err("batch fails");

        assert!(matches!(error, PipelineError::Extraction(ExtractionError::Pdf(_))));
        assert!(groq.hits_async().await <= 1);
    }

    #[tokio::test]
    async fn selector_prefix_routes_to_gemini_and_unknown_yields_no_reply() {
        let server = MockServer::start_async().await;
        let gemini = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1beta/models/gemini-pro:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "Gemini says hi" }] } }]
                }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(&server);

        let routed = pipeline
            .process_batch(
                vec![stored(dir.path(), "g.txt", "text/plain", b"Plenty of words here.")],
                "gemini-pro",
            )
            .await
            .expect("batch");
        let unrouted = pipeline
            .process_batch(
                vec![stored(dir.path(), "m.txt", "text/plain", b"Plenty of words here.")],
                "mistral-large",
            )
            .await
            .expect("batch");

        gemini.assert_hits_async(1).await;
        assert_eq!(routed[0].ai_response.as_deref(), Some("Gemini says hi"));
        assert_eq!(unrouted[0].ai_response, None);
    }

    #[tokio::test]
    async fn provider_failure_becomes_sentinel_and_files_are_kept() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("upstream exploded");
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "k.txt", "text/plain", b"Some reasonably long text.");
        let path = file.path.clone();
        let pipeline = pipeline(&server);
        assert_eq!(pipeline.batch_retention, UploadRetention::Keep);

        let reports = pipeline
            .process_batch(vec![file], "groq-llama")
            .await
            .expect("batch");

        assert_eq!(reports[0].ai_response.as_deref(), Some(AI_FAILURE_SENTINEL));
        assert!(path.exists());
        let snapshot = pipeline.metrics_snapshot();
        assert_eq!(snapshot.files_processed, 1);
        assert_eq!(snapshot.provider_failures, 1);
    }
}
