//! Extractor dispatch: turns a stored upload into text based on its declared media type.
//!
//! Exactly one extractor runs per file. Document extractors (PDF, DOCX, plain text) propagate
//! their errors to the caller. Image and video extractors talk to external collaborators and
//! degrade to a fixed sentinel string instead of failing, so the rest of the pipeline still
//! sees content for that file.

mod docx;
mod ocr;
mod pdf;
mod video;

pub use ocr::OcrClient;
pub use video::VideoCaptioner;

use crate::config::Config;
use crate::pipeline::UploadedFile;
use std::time::Duration;
use thiserror::Error;

/// Content substituted when the OCR microservice fails.
pub const OCR_FAILURE_SENTINEL: &str = "⚠️ OCR microservice failed.";
/// Content substituted when the video caption process fails.
pub const VIDEO_FAILURE_SENTINEL: &str = "⚠️ Video transcription failed.";

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PLAIN_TEXT_MIME: &str = "text/plain";

/// Errors raised by individual extractors.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Reading the stored upload failed.
    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    /// The PDF parser rejected the document.
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    /// The DOCX reader rejected the document.
    #[error("Failed to parse Word document: {0}")]
    Docx(String),
    /// A `text/plain` upload was not valid UTF-8.
    #[error("Plain text upload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// The OCR microservice could not be reached or answered with an error.
    #[error("OCR request failed: {0}")]
    Ocr(String),
    /// The caption process could not be spawned or exited unsuccessfully.
    #[error("Video caption process failed: {0}")]
    Video(String),
    /// A collaborator did not answer within the configured bound.
    #[error("{collaborator} did not respond within {after:?}")]
    Timeout {
        /// Collaborator that timed out.
        collaborator: &'static str,
        /// Bound that elapsed.
        after: Duration,
    },
}

/// Media families the dispatcher recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// `application/pdf`.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// `text/plain`.
    PlainText,
    /// Any `image/*` type.
    Image,
    /// Any `video/*` type.
    Video,
    /// Everything else; extraction yields no text.
    Unsupported,
}

impl MediaKind {
    /// Classify a declared MIME type. Parameters such as `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            PDF_MIME => Self::Pdf,
            DOCX_MIME => Self::Docx,
            PLAIN_TEXT_MIME => Self::PlainText,
            other if other.starts_with("image/") => Self::Image,
            other if other.starts_with("video/") => Self::Video,
            _ => Self::Unsupported,
        }
    }

    /// Text substituted when this kind's extractor fails, or `None` when failures propagate.
    pub fn failure_sentinel(self) -> Option<&'static str> {
        match self {
            Self::Image => Some(OCR_FAILURE_SENTINEL),
            Self::Video => Some(VIDEO_FAILURE_SENTINEL),
            _ => None,
        }
    }
}

/// Outcome of running the dispatcher on one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Which branch fired.
    pub kind: MediaKind,
    /// Extracted text; a sentinel when a graceful extractor failed.
    pub text: Option<String>,
    /// Set when `text` is a failure sentinel.
    pub degraded: bool,
}

/// Dispatches uploads to the matching extractor.
pub struct Extractor {
    ocr: OcrClient,
    captioner: VideoCaptioner,
    timeout: Duration,
}

impl Extractor {
    /// Build the dispatcher and its collaborator clients from configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            ocr: OcrClient::new(config.ocr_url.clone(), config.collaborator_timeout)?,
            captioner: VideoCaptioner::new(&config.video_caption_command),
            timeout: config.collaborator_timeout,
        })
    }

    /// Run the single extractor matching the file's declared media type.
    pub async fn extract(&self, file: &UploadedFile) -> Result<Extraction, ExtractionError> {
        let kind = MediaKind::from_mime(&file.media_type);
        tracing::debug!(
            file = %file.stored_name,
            media_type = %file.media_type,
            ?kind,
            "Dispatching extractor"
        );

        let outcome = match kind {
            MediaKind::Pdf => pdf::extract_text(tokio::fs::read(&file.path).await?)
                .await
                .map(Some),
            MediaKind::Docx => docx::extract_text(tokio::fs::read(&file.path).await?)
                .await
                .map(Some),
            MediaKind::PlainText => String::from_utf8(tokio::fs::read(&file.path).await?)
                .map(Some)
                .map_err(ExtractionError::from),
            MediaKind::Image => self.ocr.recognize(file).await,
            MediaKind::Video => self
                .captioner
                .caption(&file.path, self.timeout)
                .await
                .map(Some),
            MediaKind::Unsupported => Ok(None),
        };

        match (outcome, kind.failure_sentinel()) {
            (Ok(text), _) => Ok(Extraction {
                kind,
                text,
                degraded: false,
            }),
            (Err(error), Some(sentinel)) => {
                tracing::error!(file = %file.stored_name, ?kind, error = %error, "Extractor failed; substituting sentinel");
                Ok(Extraction {
                    kind,
                    text: Some(sentinel.to_string()),
                    degraded: true,
                })
            }
            (Err(error), None) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::stored;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn extractor(ocr_url: String, caption: &[&str]) -> Extractor {
        let config = Config {
            ocr_url,
            video_caption_command: caption.iter().map(|part| part.to_string()).collect(),
            collaborator_timeout: Duration::from_secs(5),
            ..Config::default()
        };
        Extractor::new(&config).expect("extractor")
    }

    #[test]
    fn mime_types_map_to_exactly_one_kind() {
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Pdf);
        assert_eq!(MediaKind::from_mime(DOCX_MIME), MediaKind::Docx);
        assert_eq!(
            MediaKind::from_mime("text/plain; charset=utf-8"),
            MediaKind::PlainText
        );
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("VIDEO/MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("text/markdown"), MediaKind::Unsupported);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Unsupported);
        assert_eq!(MediaKind::Image.failure_sentinel(), Some(OCR_FAILURE_SENTINEL));
        assert_eq!(MediaKind::Pdf.failure_sentinel(), None);
    }

    #[tokio::test]
    async fn plain_text_is_read_verbatim_without_touching_ocr() {
        let server = MockServer::start_async().await;
        let ocr = server
            .mock_async(|when, then| {
                when.method(POST).path("/ocr");
                then.status(200).json_body(json!({ "text": "never" }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "notes.txt", "text/plain", "héllo world\n".as_bytes());

        let extraction = extractor(server.url("/ocr"), &["true"])
            .extract(&file)
            .await
            .expect("extraction");

        assert_eq!(extraction.kind, MediaKind::PlainText);
        assert_eq!(extraction.text.as_deref(), Some("héllo world\n"));
        assert!(!extraction.degraded);
        ocr.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn image_uses_ocr_service_once() {
        let server = MockServer::start_async().await;
        let ocr = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ocr")
                    .body_contains("name=\"image\"");
                then.status(200).json_body(json!({ "text": "STOP sign" }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "sign.png", "image/png", b"\x89PNG fake");

        let extraction = extractor(server.url("/ocr"), &["true"])
            .extract(&file)
            .await
            .expect("extraction");

        ocr.assert_hits_async(1).await;
        assert_eq!(extraction.text.as_deref(), Some("STOP sign"));
    }

    #[tokio::test]
    async fn ocr_failure_degrades_to_sentinel() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ocr");
                then.status(500).body("tesseract crashed");
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "scan.jpg", "image/jpeg", b"jpeg");

        let extraction = extractor(server.url("/ocr"), &["true"])
            .extract(&file)
            .await
            .expect("image failures never escape");

        assert!(extraction.degraded);
        assert_eq!(extraction.text.as_deref(), Some(OCR_FAILURE_SENTINEL));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn video_caption_reads_process_stdout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "clip.mp4", "video/mp4", b"mp4");

        let extraction = extractor("http://127.0.0.1:9/ocr".into(), &["echo", "caption:"])
            .extract(&file)
            .await
            .expect("extraction");

        let text = extraction.text.expect("transcript");
        assert!(text.starts_with("caption:"));
        assert!(text.ends_with("clip.mp4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn video_caption_failure_degrades_to_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "clip.webm", "video/webm", b"webm");

        let extraction = extractor("http://127.0.0.1:9/ocr".into(), &["false"])
            .extract(&file)
            .await
            .expect("video failures never escape");

        assert!(extraction.degraded);
        assert_eq!(extraction.text.as_deref(), Some(VIDEO_FAILURE_SENTINEL));
    }

    #[tokio::test]
    async fn invalid_pdf_propagates_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "broken.pdf", "application/pdf", b"not a pdf");

        let error = extractor("http://127.0.0.1:9/ocr".into(), &["true"])
            .extract(&file)
            .await
            .expect_err("pdf errors propagate");

        assert!(matches!(error, ExtractionError::Pdf(_)));
    }

    #[tokio::test]
    async fn unsupported_type_yields_no_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = stored(dir.path(), "song.mp3", "audio/mpeg", b"id3");

        let extraction = extractor("http://127.0.0.1:9/ocr".into(), &["true"])
            .extract(&file)
            .await
            .expect("extraction");

        assert_eq!(extraction.kind, MediaKind::Unsupported);
        assert_eq!(extraction.text, None);
    }
}
