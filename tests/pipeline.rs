mod common;

use bytes::Bytes;
use common::{FakeExtractor, FakePosterLookup, FrameKind, MockBucket, candidate, scratch_leftovers, test_state};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use video_gallery::{
    models::admin::ProgressUpdate,
    services::{
        object_store::StoreError,
        poster_service::PosterError,
        thumbnail_service::{BulkError, BulkGenerateOptions, PipelineStep, StepError},
    },
};

const DIE_HARD_1: &str = "Movies/Die Hard/Die Hard 1.mp4";
const DIE_HARD_2: &str = "Movies/Die Hard/Die Hard 2.mp4";
const HEAT: &str = "Movies/Heat/Heat.webm";

fn drain(mut rx: mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

fn step_names(updates: &[ProgressUpdate]) -> Vec<String> {
    updates
        .iter()
        .filter_map(|update| match update {
            ProgressUpdate::Step { step, .. } => Some(step.clone()),
            ProgressUpdate::Failed { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn test_generate_thumbnail_uploads_jpeg_and_reports_every_step() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1]);
    let extractor = FakeExtractor::new(FrameKind::Checkerboard);
    let state = test_state(scratch.path(), bucket.clone(), extractor.clone(), None);
    let generation = state.catalog.cache().generation();

    let (tx, rx) = mpsc::unbounded_channel();
    state
        .thumbnails
        .generate_thumbnail_with_progress(DIE_HARD_1, 2_500, &tx)
        .await
        .unwrap();
    drop(tx);

    let thumbnail = bucket.get("Movies/Die Hard/Die Hard 1.jpg").unwrap();
    assert_eq!(thumbnail.content_type, "image/jpeg");
    assert_eq!(&thumbnail.data[..2], &[0xff, 0xd8]);
    assert_eq!(*extractor.offsets.lock().unwrap(), vec![2_500]);
    assert!(state.catalog.cache().generation() > generation);

    let updates = drain(rx);
    assert_eq!(
        step_names(&updates),
        vec![
            "Checking FFmpeg",
            "Setting up directories",
            "Clearing old thumbnail",
            "Downloading video",
            "Generating thumbnail",
            "Validating thumbnail",
            "Uploading thumbnail",
            "Clearing cache",
            "Complete",
        ]
    );
    assert_eq!(updates.last(), Some(&ProgressUpdate::step("Complete", 100)));
    assert!(scratch_leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_generate_thumbnail_replaces_existing_thumbnail() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1]);
    bucket.insert(
        "Movies/Die Hard/Die Hard 1.jpg",
        Bytes::from_static(b"stale"),
        "image/png",
    );
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        None,
    );

    state.thumbnails.generate_thumbnail(DIE_HARD_1, 1_000).await.unwrap();

    let thumbnail = bucket.get("Movies/Die Hard/Die Hard 1.jpg").unwrap();
    assert_ne!(thumbnail.data, Bytes::from_static(b"stale"));
    assert_eq!(thumbnail.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_solid_frame_fails_validation_without_upload() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1]);
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Solid),
        None,
    );
    let generation = state.catalog.cache().generation();

    let err = state
        .thumbnails
        .generate_thumbnail(DIE_HARD_1, 1_000)
        .await
        .unwrap_err();

    assert_eq!(err.step, PipelineStep::Validating);
    assert_eq!(err.key, DIE_HARD_1);
    assert!(matches!(err.source, StepError::Validation(_)));
    assert!(!bucket.contains("Movies/Die Hard/Die Hard 1.jpg"));
    assert_eq!(state.catalog.cache().generation(), generation);
    assert!(scratch_leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_failed_run_after_removing_old_thumbnail_refreshes_catalog() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1, "Movies/Die Hard/Die Hard 1.jpg"]);
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Solid),
        None,
    );

    let warm = state.catalog.catalog().await;
    assert!(warm.videos().next().unwrap().thumbnail_url.is_some());

    let err = state
        .thumbnails
        .generate_thumbnail(DIE_HARD_1, 1_000)
        .await
        .unwrap_err();
    assert_eq!(err.step, PipelineStep::Validating);
    assert!(!bucket.contains("Movies/Die Hard/Die Hard 1.jpg"));

    let after = state.catalog.catalog().await;
    let video = after.videos().next().unwrap();
    assert_eq!(video.thumbnail_url, None);
    assert_eq!(video.thumbnail_object_key, None);
}

#[tokio::test]
async fn test_missing_video_fails_at_download() {
    let scratch = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new(FrameKind::Checkerboard);
    let state = test_state(scratch.path(), MockBucket::new(), extractor.clone(), None);

    let err = state
        .thumbnails
        .generate_thumbnail("Movies/Gone/Gone.mp4", 1_000)
        .await
        .unwrap_err();

    assert_eq!(err.step, PipelineStep::Downloading);
    assert!(matches!(err.source, StepError::Store(StoreError::NotFound(_))));
    assert_eq!(extractor.extract_calls.load(Ordering::SeqCst), 0);
    assert!(err.to_string().starts_with("Downloading video failed for `Movies/Gone/Gone.mp4`"));
}

#[tokio::test]
async fn test_unavailable_tool_fails_before_touching_the_bucket() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1]);
    bucket.insert(
        "Movies/Die Hard/Die Hard 1.jpg",
        Bytes::from_static(b"keep me"),
        "image/jpeg",
    );
    let state = test_state(scratch.path(), bucket.clone(), FakeExtractor::unavailable(), None);

    let (tx, rx) = mpsc::unbounded_channel();
    let err = state
        .thumbnails
        .generate_thumbnail_with_progress(DIE_HARD_1, 1_000, &tx)
        .await
        .unwrap_err();
    drop(tx);

    assert_eq!(err.step, PipelineStep::CheckingTool);
    assert!(bucket.contains("Movies/Die Hard/Die Hard 1.jpg"));
    assert_eq!(step_names(&drain(rx)), vec!["Checking FFmpeg"]);
}

#[tokio::test]
async fn test_extractor_crash_is_reported_as_extracting() {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(
        scratch.path(),
        MockBucket::with_keys(&[DIE_HARD_1]),
        FakeExtractor::new(FrameKind::Crash),
        None,
    );

    let err = state
        .thumbnails
        .generate_thumbnail(DIE_HARD_1, 1_000)
        .await
        .unwrap_err();

    assert_eq!(err.step, PipelineStep::Extracting);
    assert!(err.to_string().contains("Invalid data found"));
    assert!(scratch_leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_clear_thumbnail_deletes_and_invalidates() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1, "Movies/Die Hard/Die Hard 1.jpg"]);
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        None,
    );
    let generation = state.catalog.cache().generation();

    state
        .thumbnails
        .clear_thumbnail("Movies/Die Hard/Die Hard 1.jpg")
        .await
        .unwrap();

    assert!(!bucket.contains("Movies/Die Hard/Die Hard 1.jpg"));
    assert!(bucket.contains(DIE_HARD_1));
    assert!(state.catalog.cache().generation() > generation);

    let err = state
        .thumbnails
        .clear_thumbnail("Movies/Die Hard/Die Hard 1.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_bulk_generate_skips_videos_with_thumbnails() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[
        DIE_HARD_1,
        DIE_HARD_2,
        "Movies/Die Hard/Die Hard 2.jpg",
        HEAT,
        "Movies/Heat/notes.txt",
    ]);
    let extractor = FakeExtractor::new(FrameKind::Checkerboard);
    let state = test_state(scratch.path(), bucket.clone(), extractor.clone(), None);
    let generation = state.catalog.cache().generation();

    let report = state
        .thumbnails
        .bulk_generate_thumbnails(BulkGenerateOptions::default())
        .await
        .unwrap();

    assert_eq!((report.processed, report.errors, report.skipped), (2, 0, 0));
    assert_eq!(extractor.extract_calls.load(Ordering::SeqCst), 2);
    assert_eq!(bucket.list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.catalog.cache().generation(), generation + 1);
    assert!(bucket.contains("Movies/Die Hard/Die Hard 1.jpg"));
    assert!(bucket.contains("Movies/Heat/Heat.jpg"));
    assert_eq!(
        bucket.get("Movies/Die Hard/Die Hard 2.jpg").unwrap().data,
        Bytes::from_static(b"video-bytes")
    );
    assert!(scratch_leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_bulk_generate_force_regenerates_everything() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1, DIE_HARD_2, "Movies/Die Hard/Die Hard 2.jpg"]);
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        None,
    );

    let report = state
        .thumbnails
        .bulk_generate_thumbnails(BulkGenerateOptions {
            force: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    let regenerated = bucket.get("Movies/Die Hard/Die Hard 2.jpg").unwrap();
    assert_eq!(regenerated.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_bulk_generate_counts_failures_and_oversized_videos() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1, HEAT]);
    bucket.insert_sized("Movies/Big/Huge.mov", 3 * 1024 * 1024);
    let extractor = FakeExtractor::new(FrameKind::Checkerboard);
    extractor.fail_for("Heat.webm");
    let state = test_state(scratch.path(), bucket.clone(), extractor.clone(), None);

    let report = state
        .thumbnails
        .bulk_generate_thumbnails(BulkGenerateOptions {
            offset_ms: 4_000,
            max_size_mb: Some(2),
            concurrency: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!((report.processed, report.errors, report.skipped), (1, 1, 1));
    assert!(bucket.contains("Movies/Die Hard/Die Hard 1.jpg"));
    assert!(!bucket.contains("Movies/Heat/Heat.jpg"));
    assert!(!bucket.contains("Movies/Big/Huge.jpg"));
    assert!(extractor.offsets.lock().unwrap().iter().all(|offset| *offset == 4_000));
    assert!(scratch_leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_bulk_generate_aborts_when_tool_or_listing_unavailable() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[DIE_HARD_1]);
    let state = test_state(scratch.path(), bucket.clone(), FakeExtractor::unavailable(), None);
    let err = state
        .thumbnails
        .bulk_generate_thumbnails(BulkGenerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BulkError::Precondition(ref inner) if inner.step == PipelineStep::CheckingTool));
    assert_eq!(bucket.list_calls.load(Ordering::SeqCst), 0);

    bucket.fail_listing(true);
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        None,
    );
    let err = state
        .thumbnails
        .bulk_generate_thumbnails(BulkGenerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BulkError::Listing(_)));
}

#[tokio::test]
async fn test_bulk_clear_deletes_only_images() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&[
        DIE_HARD_1,
        "Movies/Die Hard/Die Hard 1.jpg",
        "Movies/Die Hard/Die Hard 2.PNG",
        "Movies/Heat/Heat.jpeg",
        "Movies/Heat/readme.txt",
    ]);
    bucket.fail_delete("Movies/Heat/Heat.jpeg");
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        None,
    );

    let deleted = state.thumbnails.bulk_clear_thumbnails().await.unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(
        bucket.keys(),
        vec![DIE_HARD_1, "Movies/Heat/Heat.jpeg", "Movies/Heat/readme.txt"]
    );
}

#[tokio::test]
async fn test_fetch_poster_cleans_title_and_stores_image() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&["Movies/Nolan/Inception.mp4"]);
    let lookup = FakePosterLookup::new(vec![
        candidate("Inception: The Cobol Job", Some("/cobol.jpg"), None),
        candidate("Inception", Some("/inception.jpg"), Some("2010-07-15")),
    ]);
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        Some(lookup.clone()),
    );
    let generation = state.catalog.cache().generation();

    let (tx, rx) = mpsc::unbounded_channel();
    state
        .posters
        .fetch_movie_poster_with_progress(
            "Movies/Nolan/Inception.mp4",
            Some("Inception (2010) [1080p]"),
            &tx,
        )
        .await
        .unwrap();
    drop(tx);

    assert_eq!(*lookup.queries.lock().unwrap(), vec!["Inception"]);
    assert_eq!(
        *lookup.fetched.lock().unwrap(),
        vec!["https://images.example/w500/inception.jpg"]
    );
    let stored = bucket.get("Movies/Nolan/Inception.jpg").unwrap();
    assert_eq!(stored.data, lookup.image());
    assert_eq!(stored.content_type, "image/jpeg");
    assert!(state.catalog.cache().generation() > generation);
    assert_eq!(
        step_names(&drain(rx)),
        vec![
            "Getting API key",
            "Searching for movie",
            "Downloading poster",
            "Uploading to storage",
            "Clearing cache",
            "Complete",
        ]
    );
}

#[tokio::test]
async fn test_failed_poster_upload_refreshes_catalog() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&["Movies/Nolan/Inception.mp4", "Movies/Nolan/Inception.jpg"]);
    bucket.fail_write("Movies/Nolan/Inception.jpg");
    let state = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        Some(FakePosterLookup::new(vec![candidate("Inception", Some("/inception.jpg"), None)])),
    );

    let warm = state.catalog.catalog().await;
    assert!(warm.videos().next().unwrap().thumbnail_url.is_some());

    let err = state
        .posters
        .fetch_movie_poster("Movies/Nolan/Inception.mp4", Some("Inception"))
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::Store(_)));
    assert!(!bucket.contains("Movies/Nolan/Inception.jpg"));

    let after = state.catalog.catalog().await;
    assert_eq!(after.videos().next().unwrap().thumbnail_url, None);
}

#[tokio::test]
async fn test_fetch_poster_blank_title_uses_filename() {
    let scratch = tempfile::tempdir().unwrap();
    let lookup = FakePosterLookup::new(vec![candidate("Heat", Some("/heat.jpg"), None)]);
    let state = test_state(
        scratch.path(),
        MockBucket::with_keys(&["Movies/Mann/Heat (1995).mp4"]),
        FakeExtractor::new(FrameKind::Checkerboard),
        Some(lookup.clone()),
    );

    state
        .posters
        .fetch_movie_poster("Movies/Mann/Heat (1995).mp4", Some("   "))
        .await
        .unwrap();

    assert_eq!(*lookup.queries.lock().unwrap(), vec!["Heat"]);
}

#[tokio::test]
async fn test_fetch_poster_failures() {
    let scratch = tempfile::tempdir().unwrap();
    let bucket = MockBucket::with_keys(&["Movies/Nolan/Tenet.mp4"]);

    let disabled = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        None,
    );
    assert!(!disabled.posters.is_enabled());
    let err = disabled
        .posters
        .fetch_movie_poster("Movies/Nolan/Tenet.mp4", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::MissingApiKey));

    let empty = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        Some(FakePosterLookup::new(Vec::new())),
    );
    let err = empty
        .posters
        .fetch_movie_poster("Movies/Nolan/Tenet.mp4", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::NoResults(ref title) if title == "Tenet"));

    let posterless = test_state(
        scratch.path(),
        bucket.clone(),
        FakeExtractor::new(FrameKind::Checkerboard),
        Some(FakePosterLookup::new(vec![candidate("Tenet", None, None)])),
    );
    let err = posterless
        .posters
        .fetch_movie_poster("Movies/Nolan/Tenet.mp4", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::NoPoster(_)));
    assert!(!bucket.contains("Movies/Nolan/Tenet.jpg"));
}

#[tokio::test]
async fn test_search_posters_lists_candidates_with_images() {
    let scratch = tempfile::tempdir().unwrap();
    let lookup = FakePosterLookup::new(vec![
        candidate("Alien", Some("/alien.jpg"), Some("1979-05-25")),
        candidate("Alien Siege", None, Some("2005-01-01")),
        candidate("Aliens", Some("/aliens.jpg"), None),
    ]);
    let state = test_state(
        scratch.path(),
        MockBucket::new(),
        FakeExtractor::new(FrameKind::Checkerboard),
        Some(lookup.clone()),
    );

    let results = state.posters.search_posters("Alien [4K]").await.unwrap();

    assert_eq!(*lookup.queries.lock().unwrap(), vec!["Alien"]);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "Alien");
    assert_eq!(results[0].year.as_deref(), Some("1979"));
    assert_eq!(results[0].poster_url, "https://images.example/w500/alien.jpg");
    assert_eq!(results[0].thumbnail_url, "https://images.example/w185/alien.jpg");
    assert_eq!(results[1].year, None);

    let err = state.posters.search_posters("(2010)").await.unwrap_err();
    assert!(matches!(err, PosterError::EmptyTitle));
}
