//! Defines every route the gallery serves.
//!
//! ## Structure
//! - **Public**
//!   - `GET  /healthz`, `GET /readyz`: probes
//!   - `GET  /gallery/{stub}`: one gallery, linkable without the secret
//!   - anything else falls through to the static asset directory
//!
//! - **Secret-prefixed** (`/{secret}/...`, 404 on a wrong secret)
//!   - `GET  /{secret}/index`, `GET /{secret}/feed`, `GET /{secret}/admin`
//!   - `GET|POST /{secret}/admin/api/generate-thumbnail`: SSE progress
//!   - `POST /{secret}/admin/api/clear-thumbnail`
//!   - `POST /{secret}/admin/api/bulk-generate-thumbnails`
//!   - `POST /{secret}/admin/api/bulk-clear-thumbnails`
//!   - `GET|POST /{secret}/admin/api/fetch-movie-poster`: SSE progress
//!   - `GET  /{secret}/admin/api/search-movie-poster`

use crate::{
    errors::AppError,
    handlers::{
        admin_handlers::{
            admin_page, bulk_clear_thumbnails, bulk_generate_thumbnails, clear_thumbnail,
            fetch_movie_poster_get, fetch_movie_poster_post, generate_thumbnail_get,
            generate_thumbnail_post, search_movie_poster,
        },
        gallery_handlers::{feed, gallery_page, index_page},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::{Path, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::debug;

/// Rejects requests whose `{secret}` segment does not match, as if the
/// route did not exist.
async fn require_secret(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let supplied = params.get("secret").map(String::as_str).unwrap_or_default();
    if secret_matches(supplied, &state.config.secret_key) {
        Ok(next.run(request).await)
    } else {
        debug!(path = %request.uri().path(), "secret mismatch");
        Err(AppError::not_found("not found"))
    }
}

fn secret_matches(supplied: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
}

/// Build and return the full application router.
pub fn routes(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let gated = Router::new()
        .route("/{secret}/index", get(index_page))
        .route("/{secret}/feed", get(feed))
        .route("/{secret}/admin", get(admin_page))
        .route(
            "/{secret}/admin/api/generate-thumbnail",
            get(generate_thumbnail_get).post(generate_thumbnail_post),
        )
        .route("/{secret}/admin/api/clear-thumbnail", post(clear_thumbnail))
        .route(
            "/{secret}/admin/api/bulk-generate-thumbnails",
            post(bulk_generate_thumbnails),
        )
        .route(
            "/{secret}/admin/api/bulk-clear-thumbnails",
            post(bulk_clear_thumbnails),
        )
        .route(
            "/{secret}/admin/api/fetch-movie-poster",
            get(fetch_movie_poster_get).post(fetch_movie_poster_post),
        )
        .route(
            "/{secret}/admin/api/search-movie-poster",
            get(search_movie_poster),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/gallery/{stub}", get(gallery_page))
        .merge(gated)
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
