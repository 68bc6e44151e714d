//! Thumbnail pipeline.
//!
//! For one video: probe the extractor, prepare a private scratch directory,
//! drop any stale thumbnail, download the video, extract a frame, reject
//! blank frames, upload the JPEG beside the video and invalidate the
//! catalog. Bulk runs apply the same steps to every video that needs a
//! thumbnail, with bounded concurrency and a single invalidation at the end.

use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    collections::HashSet,
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{fs, task};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::services::{
    catalog_cache::CatalogCache,
    frame_extractor::{ExtractError, FrameExtractor},
    object_keys::{base_key, is_image_key, is_video_key, safe_local_name, thumbnail_key},
    object_store::{ObjectStoreClient, StoreError, download_to_file, list_all},
    progress::{NoProgress, ProgressReporter},
    scratch::ScratchDir,
    validation::{ValidationError, ensure_not_degenerate},
};

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";
pub const MAX_BULK_CONCURRENCY: usize = 32;
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    CheckingTool,
    PreparingScratch,
    ClearingOldThumbnail,
    Downloading,
    Extracting,
    Validating,
    Uploading,
    InvalidatingCache,
    Done,
}

impl PipelineStep {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStep::CheckingTool => "Checking FFmpeg",
            PipelineStep::PreparingScratch => "Setting up directories",
            PipelineStep::ClearingOldThumbnail => "Clearing old thumbnail",
            PipelineStep::Downloading => "Downloading video",
            PipelineStep::Extracting => "Generating thumbnail",
            PipelineStep::Validating => "Validating thumbnail",
            PipelineStep::Uploading => "Uploading thumbnail",
            PipelineStep::InvalidatingCache => "Clearing cache",
            PipelineStep::Done => "Complete",
        }
    }

    pub fn percent(self) -> u8 {
        match self {
            PipelineStep::CheckingTool => 5,
            PipelineStep::PreparingScratch => 10,
            PipelineStep::ClearingOldThumbnail => 20,
            PipelineStep::Downloading => 30,
            PipelineStep::Extracting => 60,
            PipelineStep::Validating => 70,
            PipelineStep::Uploading => 80,
            PipelineStep::InvalidatingCache => 95,
            PipelineStep::Done => 100,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A pipeline failure, tagged with the step and the key it happened on.
#[derive(Debug, Error)]
#[error("{step} failed for `{key}`: {source}")]
pub struct ThumbnailError {
    pub step: PipelineStep,
    pub key: String,
    #[source]
    pub source: StepError,
}

impl ThumbnailError {
    fn new(step: PipelineStep, key: &str, source: impl Into<StepError>) -> Self {
        Self {
            step,
            key: key.to_string(),
            source: source.into(),
        }
    }
}

/// Failures that stop a bulk run before any video is processed.
#[derive(Debug, Error)]
pub enum BulkError {
    #[error("failed to list bucket: {0}")]
    Listing(#[source] StoreError),
    #[error(transparent)]
    Precondition(#[from] ThumbnailError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkGenerateOptions {
    pub offset_ms: u64,
    /// Regenerate thumbnails that already exist.
    pub force: bool,
    /// `None` or zero means no limit.
    pub max_size_mb: Option<u64>,
    /// Overrides the configured concurrency for this run.
    pub concurrency: Option<usize>,
}

impl Default for BulkGenerateOptions {
    fn default() -> Self {
        Self {
            offset_ms: 1_000,
            force: false,
            max_size_mb: None,
            concurrency: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkGenerateReport {
    pub processed: usize,
    pub errors: usize,
    /// Videos over the size limit.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ThumbnailOptions {
    pub scratch_root: PathBuf,
    pub bulk_concurrency: usize,
    pub list_timeout: Duration,
}

/// Deletes the thumbnail a run is about to replace.
///
/// A successful delete invalidates the catalog right away, since the run
/// can still fail before a replacement is uploaded.
pub(crate) async fn remove_previous_thumbnail(
    store: &dyn ObjectStoreClient,
    cache: &CatalogCache,
    thumb_key: &str,
) {
    match store.delete_object(thumb_key).await {
        Ok(()) => {
            cache.invalidate().await;
            debug!(thumbnail = %thumb_key, "previous thumbnail removed");
        }
        Err(err) => debug!(thumbnail = %thumb_key, error = %err, "no previous thumbnail removed"),
    }
}

#[derive(Clone)]
pub struct ThumbnailService {
    store: Arc<dyn ObjectStoreClient>,
    extractor: Arc<dyn FrameExtractor>,
    cache: CatalogCache,
    options: ThumbnailOptions,
}

impl ThumbnailService {
    pub fn new(
        store: Arc<dyn ObjectStoreClient>,
        extractor: Arc<dyn FrameExtractor>,
        cache: CatalogCache,
        options: ThumbnailOptions,
    ) -> Self {
        Self {
            store,
            extractor,
            cache,
            options,
        }
    }

    pub fn extractor(&self) -> &dyn FrameExtractor {
        self.extractor.as_ref()
    }

    pub fn scratch_root(&self) -> &Path {
        &self.options.scratch_root
    }

    pub async fn generate_thumbnail(
        &self,
        video_key: &str,
        offset_ms: u64,
    ) -> Result<(), ThumbnailError> {
        self.generate_thumbnail_with_progress(video_key, offset_ms, &NoProgress)
            .await
    }

    /// Runs the full pipeline for one video, reporting each step.
    ///
    /// The scratch directory is removed whether or not the run succeeds.
    pub async fn generate_thumbnail_with_progress(
        &self,
        video_key: &str,
        offset_ms: u64,
        progress: &dyn ProgressReporter,
    ) -> Result<(), ThumbnailError> {
        let span = info_span!("thumbnail", run_id = %Uuid::new_v4(), key = %video_key);
        async move {
            let started = Instant::now();
            let advance = |step: PipelineStep| progress.report(step.label(), step.percent());

            advance(PipelineStep::CheckingTool);
            self.extractor
                .probe()
                .await
                .map_err(|err| ThumbnailError::new(PipelineStep::CheckingTool, video_key, err))?;

            advance(PipelineStep::PreparingScratch);
            let scratch = ScratchDir::create(&self.options.scratch_root)
                .await
                .map_err(|err| {
                    ThumbnailError::new(PipelineStep::PreparingScratch, video_key, err)
                })?;

            advance(PipelineStep::ClearingOldThumbnail);
            let thumb_key = thumbnail_key(video_key);
            remove_previous_thumbnail(self.store.as_ref(), &self.cache, &thumb_key).await;

            self.render_and_upload(&scratch, video_key, &thumb_key, offset_ms, progress)
                .await?;

            advance(PipelineStep::InvalidatingCache);
            self.cache.invalidate().await;

            advance(PipelineStep::Done);
            info!(
                thumbnail = %thumb_key,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "thumbnail generated"
            );
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Download, extract, validate and upload. Shared by single and bulk runs.
    async fn render_and_upload(
        &self,
        scratch: &ScratchDir,
        video_key: &str,
        thumb_key: &str,
        offset_ms: u64,
        progress: &dyn ProgressReporter,
    ) -> Result<(), ThumbnailError> {
        let advance = |step: PipelineStep| progress.report(step.label(), step.percent());
        let local_video = scratch.join(&safe_local_name(video_key));
        let local_thumb = scratch.join(&safe_local_name(thumb_key));

        advance(PipelineStep::Downloading);
        download_to_file(self.store.as_ref(), video_key, &local_video)
            .await
            .map_err(|err| ThumbnailError::new(PipelineStep::Downloading, video_key, err))?;

        advance(PipelineStep::Extracting);
        self.extractor
            .extract_frame(&local_video, &local_thumb, offset_ms)
            .await
            .map_err(|err| ThumbnailError::new(PipelineStep::Extracting, video_key, err))?;

        advance(PipelineStep::Validating);
        let validate_path = local_thumb.clone();
        let validated = task::spawn_blocking(move || ensure_not_degenerate(&validate_path))
            .await
            .map_err(|err| {
                ThumbnailError::new(PipelineStep::Validating, video_key, io::Error::other(err))
            })?;
        let report =
            validated.map_err(|err| ThumbnailError::new(PipelineStep::Validating, video_key, err))?;
        debug!(
            differing = report.differing,
            total = report.total,
            "thumbnail passed validation"
        );

        advance(PipelineStep::Uploading);
        let data = fs::read(&local_thumb)
            .await
            .map_err(|err| ThumbnailError::new(PipelineStep::Uploading, video_key, err))?;
        self.store
            .write_object(thumb_key, Bytes::from(data), THUMBNAIL_CONTENT_TYPE)
            .await
            .map_err(|err| ThumbnailError::new(PipelineStep::Uploading, video_key, err))?;
        Ok(())
    }

    /// Deletes one thumbnail and invalidates the catalog.
    pub async fn clear_thumbnail(&self, thumb_key: &str) -> Result<(), StoreError> {
        self.store.delete_object(thumb_key).await?;
        self.cache.invalidate().await;
        info!(thumbnail = %thumb_key, "thumbnail cleared");
        Ok(())
    }

    /// Generates thumbnails for every video that needs one.
    ///
    /// The bucket is listed twice: once to learn which base names already
    /// have an image, once to enumerate videos. Per-video failures are
    /// counted and logged; only an unusable extractor, scratch root or
    /// listing aborts the run.
    pub async fn bulk_generate_thumbnails(
        &self,
        options: BulkGenerateOptions,
    ) -> Result<BulkGenerateReport, BulkError> {
        let span = info_span!("bulk_thumbnails", run_id = %Uuid::new_v4());
        async move {
            let started = Instant::now();
            self.extractor
                .probe()
                .await
                .map_err(|err| ThumbnailError::new(PipelineStep::CheckingTool, "*", err))?;
            fs::create_dir_all(&self.options.scratch_root)
                .await
                .map_err(|err| ThumbnailError::new(PipelineStep::PreparingScratch, "*", err))?;

            let existing: HashSet<String> = list_all(self.store.as_ref(), self.options.list_timeout)
                .await
                .map_err(BulkError::Listing)?
                .into_iter()
                .filter(|entry| is_image_key(&entry.key))
                .map(|entry| base_key(&entry.key).to_string())
                .collect();

            let entries = list_all(self.store.as_ref(), self.options.list_timeout)
                .await
                .map_err(BulkError::Listing)?;

            let max_bytes = options
                .max_size_mb
                .filter(|mb| *mb > 0)
                .map(|mb| mb.saturating_mul(BYTES_PER_MB));
            let mut report = BulkGenerateReport::default();
            let mut pending = Vec::new();
            for entry in entries {
                if !is_video_key(&entry.key) {
                    continue;
                }
                if !options.force && existing.contains(base_key(&entry.key)) {
                    continue;
                }
                if let Some(limit) = max_bytes.filter(|limit| entry.size > *limit) {
                    info!(key = %entry.key, size = entry.size, limit, "video over size limit; skipping");
                    report.skipped += 1;
                    continue;
                }
                pending.push(entry.key);
            }

            let concurrency = options
                .concurrency
                .unwrap_or(self.options.bulk_concurrency)
                .clamp(1, MAX_BULK_CONCURRENCY);
            info!(
                videos = pending.len(),
                skipped = report.skipped,
                concurrency,
                force = options.force,
                "starting bulk thumbnail generation"
            );

            let mut outcomes = stream::iter(pending)
                .map(|key| async move {
                    let result = self.generate_one(&key, options.offset_ms).await;
                    (key, result)
                })
                .buffer_unordered(concurrency);

            while let Some((key, result)) = outcomes.next().await {
                match result {
                    Ok(()) => {
                        report.processed += 1;
                        info!(key = %key, "thumbnail generated");
                    }
                    Err(err) => {
                        report.errors += 1;
                        error!(key = %key, step = %err.step, error = %err.source, "thumbnail generation failed");
                    }
                }
            }

            self.cache.invalidate().await;
            info!(
                processed = report.processed,
                errors = report.errors,
                skipped = report.skipped,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "bulk thumbnail generation finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn generate_one(&self, video_key: &str, offset_ms: u64) -> Result<(), ThumbnailError> {
        let scratch = ScratchDir::create(&self.options.scratch_root)
            .await
            .map_err(|err| ThumbnailError::new(PipelineStep::PreparingScratch, video_key, err))?;
        let thumb_key = thumbnail_key(video_key);
        self.render_and_upload(&scratch, video_key, &thumb_key, offset_ms, &NoProgress)
            .await
    }

    /// Deletes every image object under the key convention.
    ///
    /// Returns how many were deleted; individual delete failures are logged
    /// and do not stop the run.
    pub async fn bulk_clear_thumbnails(&self) -> Result<usize, StoreError> {
        let entries = list_all(self.store.as_ref(), self.options.list_timeout).await?;
        let mut deleted = 0;
        for entry in entries.iter().filter(|entry| is_image_key(&entry.key)) {
            match self.store.delete_object(&entry.key).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!(key = %entry.key, error = %err, "failed to delete thumbnail"),
            }
        }
        self.cache.invalidate().await;
        info!(deleted, "bulk thumbnail clear finished");
        Ok(deleted)
    }
}
