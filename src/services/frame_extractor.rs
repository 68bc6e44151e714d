//! Single-frame extraction through an external tool.

use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::services::object_keys::format_offset;

const STDERR_TAIL_BYTES: usize = 2048;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("frame extractor `{binary}` is not available: {reason}")]
    Unavailable { binary: String, reason: String },
    #[error("frame extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("frame extraction failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },
    #[error("frame extraction produced no output at {}", .0.display())]
    MissingOutput(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Checks the tool can be launched at all.
    async fn probe(&self) -> Result<(), ExtractError>;

    /// Writes one representative frame near `offset_ms` of `input` to
    /// `output` as a JPEG.
    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        offset_ms: u64,
    ) -> Result<(), ExtractError>;
}

/// Runs `ffmpeg` with its `thumbnail` filter, which picks a representative
/// frame from the batch following the seek point.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    binary: String,
    quality: u8,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(binary: impl Into<String>, quality: u8, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            quality,
            timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn unavailable(&self, reason: impl Into<String>) -> ExtractError {
        ExtractError::Unavailable {
            binary: self.binary.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn probe(&self) -> Result<(), ExtractError> {
        let status = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, status).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(self.unavailable(format!("`-version` exited with {status}"))),
            Ok(Err(err)) => Err(self.unavailable(err.to_string())),
            Err(_) => Err(self.unavailable("`-version` did not answer in time")),
        }
    }

    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        offset_ms: u64,
    ) -> Result<(), ExtractError> {
        let offset = format_offset(offset_ms);
        let quality = self.quality.to_string();
        debug!(binary = %self.binary, input = %input.display(), offset = %offset, "extracting frame");

        let run = Command::new(&self.binary)
            .arg("-ss")
            .arg(&offset)
            .arg("-i")
            .arg(input)
            .args(["-vf", "thumbnail", "-frames:v", "1", "-q:v", quality.as_str(), "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => return Err(ExtractError::Timeout(self.timeout)),
        };
        let result = result.map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => self.unavailable(err.to_string()),
            _ => ExtractError::Io(err),
        })?;

        if !result.status.success() {
            return Err(ExtractError::Failed {
                status: result.status.to_string(),
                stderr: stderr_tail(&result.stderr),
            });
        }
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ExtractError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_reports_missing_binary() {
        let extractor = FfmpegExtractor::new(
            "/nonexistent/definitely-not-ffmpeg",
            2,
            Duration::from_secs(5),
        );
        let err = extractor.probe().await.unwrap_err();
        assert!(matches!(err, ExtractError::Unavailable { .. }));
        assert!(err.to_string().contains("definitely-not-ffmpeg"));
    }

    #[tokio::test]
    async fn test_extract_with_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FfmpegExtractor::new(
            "/nonexistent/definitely-not-ffmpeg",
            2,
            Duration::from_secs(5),
        );
        let err = extractor
            .extract_frame(&dir.path().join("in.mp4"), &dir.path().join("out.jpg"), 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unavailable { .. }));
    }

    #[test]
    fn test_stderr_tail_keeps_the_end() {
        let long = format!("{}END", "x".repeat(5000));
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
        assert!(tail.ends_with("END"));
    }
}
