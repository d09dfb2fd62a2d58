//! Tracing configuration and log routing.
//!
//! Every event goes to stdout and to a file. Development builds print compact lines; production
//! prints one JSON object per event so log shippers can index the structured pipeline fields.
//! `MEDIARELAY_LOG_FILE` pins the file; otherwise `logs/mediarelay.log` rotates daily.
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::AppEnvironment;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,tower_http=info";

/// Where the file layer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Append to a single fixed file.
    File(PathBuf),
    /// Rotate daily inside `directory`, one file per day prefixed with `file_name`.
    DailyRolling {
        /// Directory holding the rotated files.
        directory: PathBuf,
        /// File name prefix.
        file_name: String,
    },
}

impl LogDestination {
    /// Resolve the destination from an optional explicit path.
    pub fn resolve(explicit: Option<String>) -> Self {
        match explicit.filter(|path| !path.trim().is_empty()) {
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::DailyRolling {
                directory: PathBuf::from("logs"),
                file_name: "mediarelay.log".to_string(),
            },
        }
    }

    fn open(&self) -> Option<NonBlocking> {
        let (writer, guard) = match self {
            Self::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                    .ok()?;
                tracing_appender::non_blocking(file)
            }
            Self::DailyRolling {
                directory,
                file_name,
            } => {
                std::fs::create_dir_all(directory)
                    .map_err(|err| eprintln!("Failed to create logs directory: {err}"))
                    .ok()?;
                tracing_appender::non_blocking(tracing_appender::rolling::daily(
                    directory, file_name,
                ))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Some(writer)
    }
}

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info,tower_http=info`).
/// - Emits JSON on stdout in production, compact text otherwise.
/// - Keeps the non-blocking writer guard alive for the process lifetime.
pub fn init_tracing(app_env: AppEnvironment) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout_layer = match app_env {
        AppEnvironment::Production => fmt::layer().json().with_current_span(false).boxed(),
        AppEnvironment::Development => fmt::layer().with_target(false).compact().boxed(),
    };

    let destination = LogDestination::resolve(std::env::var("MEDIARELAY_LOG_FILE").ok());
    let file_layer = destination.open().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
