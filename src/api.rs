//! HTTP surface for mediarelay.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /api/upload?model=<selector>` – Store every multipart `files` part, extract text per
//!   MIME type, and ask the selected provider about it. Responds with one report per file, in
//!   upload order.
//! - `POST /api/voice/sessions/:session_id/voice-upload?model=gemini|groq` – Transcribe the
//!   multipart `audio` part, answer it, and append both turns to the session.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//! - `GET <public prefix>/<stored name>` – Retained batch uploads, when retention is enabled.

use crate::config::{Config, UploadRetention};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{FileReport, PipelineApi, PipelineError, UploadedFile, release_upload};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path as UrlPath, Query, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::{services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

/// Room left for multipart boundaries and part headers on top of the voice size cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const GENERIC_FAILURE: &str = "An internal error occurred";
/// Provider used by the voice endpoint when `model` is absent.
const DEFAULT_VOICE_MODEL: &str = "groq";

/// Router-level settings derived from [`Config`].
#[derive(Clone, Debug)]
pub struct RouterSettings {
    /// Directory multipart files are written to.
    pub upload_dir: PathBuf,
    /// URL prefix retained uploads are served under.
    pub public_upload_prefix: String,
    /// Selector used by the batch endpoint when `model` is absent.
    pub default_batch_model: String,
    /// Request body cap for the batch endpoint.
    pub batch_max_upload_bytes: usize,
    /// Size cap for a single voice upload.
    pub voice_max_upload_bytes: usize,
    /// Whether 500 responses carry the underlying error text.
    pub expose_error_details: bool,
    /// Whether retained uploads are served as static files.
    pub serve_uploads: bool,
}

impl RouterSettings {
    /// Derive router settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            public_upload_prefix: config.public_upload_prefix.clone(),
            default_batch_model: config.default_batch_model.clone(),
            batch_max_upload_bytes: config.batch_max_upload_bytes,
            voice_max_upload_bytes: config.voice_max_upload_bytes,
            expose_error_details: config.app_env.exposes_error_details(),
            serve_uploads: config.batch_retention == UploadRetention::Keep,
        }
    }
}

struct AppState<S> {
    service: Arc<S>,
    settings: Arc<RouterSettings>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Build the HTTP router exposing the upload and voice API surface.
pub fn create_router<S>(service: Arc<S>, settings: RouterSettings) -> Router
where
    S: PipelineApi + 'static,
{
    let batch_limit = settings.batch_max_upload_bytes;
    let voice_limit = settings.voice_max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let static_uploads = settings
        .serve_uploads
        .then(|| (settings.public_upload_prefix.clone(), settings.upload_dir.clone()));

    let mut router = Router::new()
        .route(
            "/api/upload",
            post(upload_files::<S>).layer(DefaultBodyLimit::max(batch_limit)),
        )
        .route(
            "/api/voice/sessions/:session_id/voice-upload",
            post(voice_upload::<S>).layer(DefaultBodyLimit::max(voice_limit)),
        )
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(AppState {
            service,
            settings: Arc::new(settings),
        });

    if let Some((prefix, dir)) = static_uploads {
        router = if prefix == "/" {
            router.fallback_service(ServeDir::new(dir))
        } else {
            router.nest_service(&prefix, ServeDir::new(dir))
        };
    }

    router.layer(TraceLayer::new_for_http())
}

/// Query string shared by both upload endpoints.
#[derive(Deserialize, Default)]
struct ModelQuery {
    #[serde(default)]
    model: Option<String>,
}

/// Success response for `POST /api/upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    files: Vec<FileReport>,
}

/// Store every `files` part, then run the batch pipeline over them.
///
/// Parts under any other field name are ignored. A request without files succeeds with an
/// empty report list.
async fn upload_files<S>(
    State(state): State<AppState<S>>,
    Query(query): Query<ModelQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: PipelineApi,
{
    let selector = query
        .model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| state.settings.default_batch_model.clone())
        .trim()
        .to_lowercase();

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        files.push(store_field(field, &state.settings.upload_dir, None).await?);
    }
    if files.is_empty() {
        tracing::info!("Upload request carried no files");
        return Ok(Json(UploadResponse {
            message: "Files uploaded, parsed, and processed successfully",
            files: Vec::new(),
        }));
    }

    let count = files.len();
    let reports = state
        .service
        .process_batch(files, &selector)
        .await
        .map_err(|error| AppError::batch(error, state.settings.expose_error_details))?;
    tracing::info!(files = count, selector = %selector, "Upload request completed");

    Ok(Json(UploadResponse {
        message: "Files uploaded, parsed, and processed successfully",
        files: reports,
    }))
}

/// Success response for the voice endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceResponse {
    transcription: String,
    reply: String,
    success: bool,
    model_used: String,
}

/// Store the `audio` part and run the voice pipeline for `session_id`.
///
/// `model` is passed through as given; selection ignores case and `modelUsed` echoes it.
async fn voice_upload<S>(
    State(state): State<AppState<S>>,
    UrlPath(session_id): UrlPath<String>,
    Query(query): Query<ModelQuery>,
    mut multipart: Multipart,
) -> Result<Json<VoiceResponse>, AppError>
where
    S: PipelineApi,
{
    let selector = query
        .model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_VOICE_MODEL.to_string());
    let limit = state.settings.voice_max_upload_bytes;

    let mut audio = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("audio") {
            audio = Some(store_field(field, &state.settings.upload_dir, Some(limit)).await?);
            break;
        }
    }
    let Some(audio) = audio else {
        return Err(AppError::bad_request("No audio file uploaded"));
    };

    let reply = state
        .service
        .process_voice(&session_id, audio, &selector)
        .await
        .map_err(|error| AppError::voice(error, state.settings.expose_error_details))?;

    Ok(Json(VoiceResponse {
        transcription: reply.transcription,
        reply: reply.reply,
        success: true,
        model_used: reply.model_used,
    }))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(state.service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/api/upload?model=<selector>",
                description: "Upload one or more multipart `files` parts. Each file is parsed by MIME type and the text is sent to the provider whose name prefixes `model` (default groq).",
                request_example: Some(json!({
                    "files": ["report.pdf", "scan.png"],
                    "model": "gemini-1.5-flash"
                })),
            },
            CommandDescriptor {
                name: "voice_upload",
                method: "POST",
                path: "/api/voice/sessions/:session_id/voice-upload?model=gemini|groq",
                description: "Upload a multipart `audio` part. The transcript and the assistant reply are appended to the session. Response returns { \"transcription\", \"reply\", \"success\", \"modelUsed\" }.",
                request_example: Some(json!({
                    "audio": "note.webm",
                    "model": "gemini"
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
                request_example: None,
            },
            CommandDescriptor {
                name: "uploads",
                method: "GET",
                path: "/uploads/:stored_name",
                description: "Download a retained batch upload by the `filename` returned in its report.",
                request_example: None,
            },
        ],
    })
}

/// Persist one multipart part as `<unix-millis>-<random>-<name>` inside `dir`.
///
/// A partially written file is removed before the error is returned.
async fn store_field(
    mut field: Field<'_>,
    dir: &Path,
    limit: Option<usize>,
) -> Result<UploadedFile, AppError> {
    let original_name = field.file_name().unwrap_or("upload").to_string();
    let media_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let stored_name = stored_name_for(&original_name);
    let path = dir.join(&stored_name);

    match write_field(&mut field, &path, limit).await {
        Ok(size) => {
            tracing::debug!(file = %stored_name, size, media_type, "Stored upload");
            Ok(UploadedFile {
                path,
                stored_name,
                original_name,
                media_type,
                size,
            })
        }
        Err(error) => {
            release_upload(&path, UploadRetention::Delete).await;
            Err(error)
        }
    }
}

async fn write_field(
    field: &mut Field<'_>,
    path: &Path,
    limit: Option<usize>,
) -> Result<u64, AppError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(AppError::storage)?;
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(AppError::storage)?;
    let mut size = 0usize;
    while let Some(chunk) = field.chunk().await? {
        size += chunk.len();
        if let Some(limit) = limit.filter(|limit| size > *limit) {
            return Err(AppError::too_large(limit));
        }
        file.write_all(&chunk).await.map_err(AppError::storage)?;
    }
    file.flush().await.map_err(AppError::storage)?;
    Ok(size as u64)
}

fn stored_name_for(original_name: &str) -> String {
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let random = Uuid::new_v4().as_u128() % 1_000_000_000;
    format!("{millis}-{random}-{}", sanitize_file_name(original_name))
}

/// Keep only the final path component and replace anything outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    body: Value,
}

impl AppError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": message }),
        }
    }

    fn too_large(limit: usize) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            body: json!({ "error": format!("File exceeds the {limit}-byte upload limit") }),
        }
    }

    fn storage(error: std::io::Error) -> Self {
        tracing::error!(error = %error, "Failed to store upload");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": "Failed to store upload" }),
        }
    }

    fn batch(error: PipelineError, expose_details: bool) -> Self {
        tracing::error!(error = %error, "Upload failed");
        let detail = if expose_details {
            error.to_string()
        } else {
            GENERIC_FAILURE.to_string()
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "message": "Upload failed", "error": detail }),
        }
    }

    fn voice(error: PipelineError, expose_details: bool) -> Self {
        if error.is_client_error() {
            let status = match error {
                PipelineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            tracing::info!(status = %status, error = %error, "Voice request rejected");
            return Self {
                status,
                body: json!({ "error": error.to_string() }),
            };
        }
        tracing::error!(error = %error, "Voice processing failed");
        let mut body = json!({ "error": "Voice processing failed" });
        if expose_details {
            body["details"] = Value::String(error.to_string());
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        tracing::warn!(error = %error, "Rejected multipart body");
        Self {
            status: error.status(),
            body: json!({ "error": error.body_text() }),
        }
    }
}
