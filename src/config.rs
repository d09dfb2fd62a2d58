use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Deployment mode; controls whether error details are echoed to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnvironment {
    /// Local or staging deployment. Error details are included in responses.
    Development,
    /// Production deployment. Error details stay in the logs.
    Production,
}

impl AppEnvironment {
    /// Whether failure responses may carry the underlying error text.
    pub fn exposes_error_details(self) -> bool {
        !matches!(self, Self::Production)
    }
}

impl std::str::FromStr for AppEnvironment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "local" | "test" | "staging" => Ok(Self::Development),
            _ => Err(()),
        }
    }
}

/// What happens to an uploaded file once its pipeline has finished with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadRetention {
    /// Leave the file in the upload directory so it can be served later.
    Keep,
    /// Remove the file on every exit path, success or failure.
    Delete,
}

impl UploadRetention {
    fn from_flag(retain: bool) -> Self {
        if retain { Self::Keep } else { Self::Delete }
    }
}

/// Runtime configuration for the relay server.
///
/// Built once at process start and handed by reference to every client constructor, so no
/// component reads credentials from the environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Deployment mode.
    pub app_env: AppEnvironment,
    /// Directory receiving multipart uploads.
    pub upload_dir: PathBuf,
    /// URL prefix under which retained uploads are served.
    pub public_upload_prefix: String,
    /// Directory holding JSON session documents.
    pub session_dir: PathBuf,
    /// OCR microservice endpoint (multipart `image` in, `{ "text" }` out).
    pub ocr_url: String,
    /// Speech transcription endpoint (multipart `audio` in, `{ "transcript" }` out).
    pub transcription_url: String,
    /// Program and leading arguments of the video caption process; the file path is appended.
    pub video_caption_command: Vec<String>,
    /// Gemini API key. Checked when the Gemini path is used, not at startup.
    pub gemini_api_key: Option<String>,
    /// Groq API key.
    pub groq_api_key: Option<String>,
    /// Base URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Base URL of the Groq OpenAI-compatible API.
    pub groq_base_url: String,
    /// Model selector used by the batch endpoint when the request names none.
    pub default_batch_model: String,
    /// Upper bound for each OCR, caption, and provider call.
    pub collaborator_timeout: Duration,
    /// Upper bound for the voice transcription call.
    pub voice_transcription_timeout: Duration,
    /// Size cap for a single voice upload.
    pub voice_max_upload_bytes: usize,
    /// Body size cap for a batch upload request.
    pub batch_max_upload_bytes: usize,
    /// Retention policy for batch uploads.
    pub batch_retention: UploadRetention,
    /// Retention policy for voice uploads.
    pub voice_retention: UploadRetention,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: None,
            app_env: AppEnvironment::Development,
            upload_dir: PathBuf::from("uploads"),
            public_upload_prefix: "/uploads".to_string(),
            session_dir: PathBuf::from("sessions"),
            ocr_url: "http://localhost:5003/ocr".to_string(),
            transcription_url: "http://localhost:5001/transcribe".to_string(),
            video_caption_command: vec![
                "python".to_string(),
                "uploads/video_captioning/caption_video.py".to_string(),
            ],
            gemini_api_key: None,
            groq_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            default_batch_model: "groq".to_string(),
            collaborator_timeout: Duration::from_secs(120),
            voice_transcription_timeout: Duration::from_secs(60),
            voice_max_upload_bytes: 10 * 1024 * 1024,
            batch_max_upload_bytes: 100 * 1024 * 1024,
            batch_retention: UploadRetention::Keep,
            voice_retention: UploadRetention::Delete,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            server_port: parse_optional("SERVER_PORT")?,
            app_env: match load_env_optional("APP_ENV") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("APP_ENV".to_string()))?,
                None => defaults.app_env,
            },
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            public_upload_prefix: load_env_optional("PUBLIC_UPLOAD_PREFIX")
                .map(|value| normalize_prefix(&value))
                .unwrap_or(defaults.public_upload_prefix),
            session_dir: load_env_optional("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            ocr_url: load_env_optional("OCR_URL").unwrap_or(defaults.ocr_url),
            transcription_url: load_env_optional("TRANSCRIPTION_URL")
                .unwrap_or(defaults.transcription_url),
            video_caption_command: match load_env_optional("VIDEO_CAPTION_COMMAND") {
                Some(value) => split_command(&value)
                    .ok_or_else(|| ConfigError::InvalidValue("VIDEO_CAPTION_COMMAND".into()))?,
                None => defaults.video_caption_command,
            },
            gemini_api_key: load_env_optional("GEMINI_API_KEY"),
            groq_api_key: load_env_optional("GROQ_API_KEY"),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or(defaults.gemini_base_url),
            groq_base_url: load_env_optional("GROQ_BASE_URL").unwrap_or(defaults.groq_base_url),
            default_batch_model: load_env_optional("DEFAULT_BATCH_MODEL")
                .map(|value| value.to_lowercase())
                .unwrap_or(defaults.default_batch_model),
            collaborator_timeout: parse_optional("COLLABORATOR_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.collaborator_timeout),
            voice_transcription_timeout: parse_optional("VOICE_TRANSCRIPTION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.voice_transcription_timeout),
            voice_max_upload_bytes: parse_optional("VOICE_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.voice_max_upload_bytes),
            batch_max_upload_bytes: parse_optional("BATCH_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.batch_max_upload_bytes),
            batch_retention: parse_flag("BATCH_RETAIN_UPLOADS")?
                .map(UploadRetention::from_flag)
                .unwrap_or(defaults.batch_retention),
            voice_retention: parse_flag("VOICE_RETAIN_UPLOADS")?
                .map(UploadRetention::from_flag)
                .unwrap_or(defaults.voice_retention),
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    load_env_optional(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        })
        .transpose()
}

fn split_command(value: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() { None } else { Some(parts) }
}

fn normalize_prefix(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    CONFIG.set(config).expect("Failed to set config");
}

impl Config {
    /// Log where the relay will reach its collaborators. Keys are reported as present or absent.
    ///
    /// Call after the tracing subscriber is installed.
    pub fn log_summary(&self) {
        tracing::info!(
            upload_dir = %self.upload_dir.display(),
            session_dir = %self.session_dir.display(),
            ocr_url = %self.ocr_url,
            transcription_url = %self.transcription_url,
            server_port = ?self.server_port,
            app_env = ?self.app_env,
            has_gemini_key = self.gemini_api_key.is_some(),
            has_groq_key = self.groq_api_key.is_some(),
            "Loaded configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_defaults_differ_per_pipeline() {
        let config = Config::default();
        assert_eq!(config.batch_retention, UploadRetention::Keep);
        assert_eq!(config.voice_retention, UploadRetention::Delete);
        assert_eq!(config.voice_transcription_timeout, Duration::from_secs(60));
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("files/"), "/files");
        assert_eq!(normalize_prefix("/uploads"), "/uploads");
    }

    #[test]
    fn caption_command_splits_on_whitespace() {
        assert_eq!(
            split_command("python3  caption.py --quiet"),
            Some(vec![
                "python3".to_string(),
                "caption.py".to_string(),
                "--quiet".to_string()
            ])
        );
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn production_hides_error_details() {
        assert!(!AppEnvironment::Production.exposes_error_details());
        assert!(AppEnvironment::Development.exposes_error_details());
        assert_eq!("PROD".parse::<AppEnvironment>(), Ok(AppEnvironment::Production));
        assert!("mars".parse::<AppEnvironment>().is_err());
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("MEDIARELAY_TEST_BAD_FLAG", "sometimes") };

        let error = parse_flag("MEDIARELAY_TEST_BAD_FLAG").expect_err("invalid flag");

        assert!(matches!(&error, ConfigError::InvalidValue(key) if key == "MEDIARELAY_TEST_BAD_FLAG"));
        assert_eq!(
            error.to_string(),
            "Invalid value for environment variable: MEDIARELAY_TEST_BAD_FLAG"
        );
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn summary_reaches_installed_subscriber_without_keys() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let config = Config {
            ocr_url: "http://ocr.internal/ocr".into(),
            gemini_api_key: Some("secret-gemini".into()),
            ..Config::default()
        };

        tracing::subscriber::with_default(subscriber, || config.log_summary());

        let output = String::from_utf8(captured.0.lock().expect("log buffer").clone())
            .expect("utf8 log");
        assert!(output.contains("Loaded configuration"));
        assert!(output.contains("http://ocr.internal/ocr"));
        assert!(output.contains("has_gemini_key=true"));
        assert!(!output.contains("secret-gemini"));
    }
}
