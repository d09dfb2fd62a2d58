use super::ExtractionError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_FAILURE: &str = "Python captioning failed.";

/// Runs the external caption process that turns a video's audio track into text.
pub struct VideoCaptioner {
    program: String,
    args: Vec<String>,
}

impl VideoCaptioner {
    /// `command[0]` is the program; the remaining entries precede the video path.
    pub fn new(command: &[String]) -> Self {
        let (program, args) = command
            .split_first()
            .map(|(program, args)| (program.clone(), args.to_vec()))
            .unwrap_or_else(|| ("python".to_string(), Vec::new()));
        Self { program, args }
    }

    /// Run the process on `path` and return its trimmed stdout.
    ///
    /// The child is killed if `timeout` elapses.
    pub async fn caption(&self, path: &Path, timeout: Duration) -> Result<String, ExtractionError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| ExtractionError::Timeout {
                collaborator: "video caption process",
                after: timeout,
            })?
            .map_err(|error| ExtractionError::Video(format!("failed to spawn {}: {error}", self.program)))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(status = ?output.status.code(), "Caption process exited unsuccessfully");
        Err(ExtractionError::Video(if stderr.is_empty() {
            DEFAULT_FAILURE.to_string()
        } else {
            stderr
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn captioner(parts: &[&str]) -> VideoCaptioner {
        let command: Vec<String> = parts.iter().map(|part| part.to_string()).collect();
        VideoCaptioner::new(&command)
    }

    #[tokio::test]
    async fn stderr_becomes_error_text() {
        let error = captioner(&["sh", "-c", "echo 'no audio stream' >&2; exit 3", "caption"])
            .caption(Path::new("clip.mp4"), Duration::from_secs(5))
            .await
            .expect_err("non-zero exit");
        assert!(matches!(error, ExtractionError::Video(message) if message == "no audio stream"));
    }

    #[tokio::test]
    async fn silent_failure_uses_default_message() {
        let error = captioner(&["false"])
            .caption(Path::new("clip.mp4"), Duration::from_secs(5))
            .await
            .expect_err("non-zero exit");
        assert!(matches!(error, ExtractionError::Video(message) if message == DEFAULT_FAILURE));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let error = captioner(&["sh", "-c", "sleep 5", "caption"])
            .caption(Path::new("clip.mp4"), Duration::from_millis(100))
            .await
            .expect_err("timeout");
        assert!(matches!(error, ExtractionError::Timeout { .. }));
    }
}
