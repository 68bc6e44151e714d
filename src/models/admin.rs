//! Admin API payloads.

use serde::{Deserialize, Serialize};

fn default_time_ms() -> u64 {
    1_000
}

/// Body (POST) or query string (GET) of a single thumbnail generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateThumbnailRequest {
    pub video_path: String,
    #[serde(default = "default_time_ms")]
    pub time_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearThumbnailRequest {
    pub thumbnail_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkGenerateRequest {
    pub time_ms: Option<u64>,
    pub force: bool,
    /// Videos larger than this many megabytes are skipped.
    pub max_size_mb: Option<u64>,
}

/// An empty or missing title falls back to the video's filename.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPosterRequest {
    pub video_path: String,
    #[serde(default)]
    pub movie_title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPosterQuery {
    pub movie_title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkGenerateResponse {
    pub message: String,
    pub processed: usize,
    pub errors: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkClearResponse {
    pub message: String,
    pub deleted: usize,
}

/// One server-sent progress event.
///
/// Serializes as `{"step": .., "progress": ..}` while running and
/// `{"error": .., "progress": -1}` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProgressUpdate {
    Step { step: String, progress: i32 },
    Failed { error: String, progress: i32 },
}

impl ProgressUpdate {
    pub fn step(step: impl Into<String>, percent: u8) -> Self {
        Self::Step {
            step: step.into(),
            progress: i32::from(percent),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            progress: -1,
        }
    }
}
