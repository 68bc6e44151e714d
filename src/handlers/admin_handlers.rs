//! Admin page and JSON API, all behind the secret prefix.
//!
//! Single-video operations stream progress as server-sent events so the
//! page can show each pipeline step; bulk operations answer once with
//! counts.

use axum::{
    Json,
    extract::{Query, State},
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, stream};
use std::{convert::Infallible, future::Future};
use tera::Context;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info};

use crate::{
    errors::AppError,
    models::{
        admin::{
            BulkClearResponse, BulkGenerateRequest, BulkGenerateResponse, ClearThumbnailRequest,
            FetchPosterRequest, GenerateThumbnailRequest, MessageResponse, ProgressUpdate,
            SearchPosterQuery,
        },
        poster::MoviePosterResult,
    },
    services::thumbnail_service::BulkGenerateOptions,
    state::AppState,
    templates::{self, ADMIN},
};

pub async fn admin_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let catalog = state.catalog.catalog().await;
    let mut context = Context::new();
    context.insert("categories", &catalog.categories);
    context.insert("secret", &state.config.secret_key);
    context.insert("poster_enabled", &state.posters.is_enabled());
    templates::render(&state.templates, ADMIN, &context)
}

/// Runs `job` in the background and turns what it reports into an event
/// stream. The stream ends when the job drops its sender.
fn progress_events<F, Fut>(job: F) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: FnOnce(UnboundedSender<ProgressUpdate>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(job(tx));

    let events = stream::unfold(rx, |mut rx| async move {
        let update = rx.recv().await?;
        let event = Event::default().json_data(&update).unwrap_or_else(|err| {
            Event::default().comment(format!("unserializable progress update: {err}"))
        });
        Some((Ok(event), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Rejects blank values; object keys may start or end with spaces, so the
/// value is returned as given.
fn required(value: &str, field: &str) -> Result<String, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// `GET /{secret}/admin/api/generate-thumbnail?videoPath=..&timeMs=..`
pub async fn generate_thumbnail_get(
    State(state): State<AppState>,
    Query(request): Query<GenerateThumbnailRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    start_generation(state, request)
}

/// `POST /{secret}/admin/api/generate-thumbnail` with a JSON body.
pub async fn generate_thumbnail_post(
    State(state): State<AppState>,
    Json(request): Json<GenerateThumbnailRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    start_generation(state, request)
}

fn start_generation(
    state: AppState,
    request: GenerateThumbnailRequest,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let video_path = required(&request.video_path, "videoPath")?;
    let offset_ms = request.time_ms;
    info!(key = %video_path, offset_ms, "thumbnail generation requested");

    Ok(progress_events(move |tx| async move {
        let result = state
            .thumbnails
            .generate_thumbnail_with_progress(&video_path, offset_ms, &tx)
            .await;
        if let Err(err) = result {
            error!(key = %err.key, step = %err.step, error = %err.source, "thumbnail generation failed");
            let _ = tx.send(ProgressUpdate::failed(err.to_string()));
        }
    }))
}

/// `POST /{secret}/admin/api/clear-thumbnail`
pub async fn clear_thumbnail(
    State(state): State<AppState>,
    Json(request): Json<ClearThumbnailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let thumbnail_path = required(&request.thumbnail_path, "thumbnailPath")?;
    state.thumbnails.clear_thumbnail(&thumbnail_path).await?;
    Ok(Json(MessageResponse {
        message: format!("Cleared thumbnail {thumbnail_path}"),
    }))
}

/// `POST /{secret}/admin/api/bulk-generate-thumbnails`
pub async fn bulk_generate_thumbnails(
    State(state): State<AppState>,
    request: Option<Json<BulkGenerateRequest>>,
) -> Result<Json<BulkGenerateResponse>, AppError> {
    let Json(request) = request.unwrap_or_default();
    let defaults = BulkGenerateOptions::default();
    let options = BulkGenerateOptions {
        offset_ms: request.time_ms.unwrap_or(defaults.offset_ms),
        force: request.force,
        max_size_mb: request.max_size_mb,
        concurrency: None,
    };
    let report = state.thumbnails.bulk_generate_thumbnails(options).await?;
    Ok(Json(BulkGenerateResponse {
        message: format!(
            "Generated {} thumbnails ({} errors, {} skipped)",
            report.processed, report.errors, report.skipped
        ),
        processed: report.processed,
        errors: report.errors,
        skipped: report.skipped,
    }))
}

/// `POST /{secret}/admin/api/bulk-clear-thumbnails`
pub async fn bulk_clear_thumbnails(
    State(state): State<AppState>,
) -> Result<Json<BulkClearResponse>, AppError> {
    let deleted = state.thumbnails.bulk_clear_thumbnails().await?;
    Ok(Json(BulkClearResponse {
        message: format!("Deleted {deleted} thumbnails"),
        deleted,
    }))
}

/// `GET /{secret}/admin/api/fetch-movie-poster?videoPath=..&movieTitle=..`
pub async fn fetch_movie_poster_get(
    State(state): State<AppState>,
    Query(request): Query<FetchPosterRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    start_poster_fetch(state, request)
}

/// `POST /{secret}/admin/api/fetch-movie-poster` with a JSON body.
pub async fn fetch_movie_poster_post(
    State(state): State<AppState>,
    Json(request): Json<FetchPosterRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    start_poster_fetch(state, request)
}

fn start_poster_fetch(
    state: AppState,
    request: FetchPosterRequest,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let video_path = required(&request.video_path, "videoPath")?;
    let movie_title = request.movie_title;
    info!(key = %video_path, title = ?movie_title, "poster fetch requested");

    Ok(progress_events(move |tx| async move {
        let result = state
            .posters
            .fetch_movie_poster_with_progress(&video_path, movie_title.as_deref(), &tx)
            .await;
        if let Err(err) = result {
            error!(key = %video_path, error = %err, "poster fetch failed");
            let _ = tx.send(ProgressUpdate::failed(err.to_string()));
        }
    }))
}

/// `GET /{secret}/admin/api/search-movie-poster?movieTitle=..`
pub async fn search_movie_poster(
    State(state): State<AppState>,
    Query(query): Query<SearchPosterQuery>,
) -> Result<Json<Vec<MoviePosterResult>>, AppError> {
    let title = required(&query.movie_title, "movieTitle")?;
    let results = state.posters.search_posters(&title).await?;
    Ok(Json(results))
}
