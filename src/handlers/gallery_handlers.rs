//! Catalog pages and the JSON feed.
//!
//! - GET /{secret}/index     -> every category and gallery
//! - GET /{secret}/feed      -> the catalog as JSON
//! - GET /gallery/{stub}     -> one gallery, shareable without the secret

use axum::{
    Json,
    extract::{Path, State},
    response::Html,
};
use tera::Context;
use tracing::debug;

use crate::{
    errors::AppError,
    models::catalog::FeedCategory,
    state::AppState,
    templates::{self, GALLERY, INDEX},
};

pub async fn index_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let catalog = state.catalog.catalog().await;
    let mut context = Context::new();
    context.insert("categories", &catalog.categories);
    context.insert("built_at", &catalog.built_at.to_rfc3339());
    templates::render(&state.templates, INDEX, &context)
}

pub async fn feed(State(state): State<AppState>) -> Json<Vec<FeedCategory>> {
    let catalog = state.catalog.catalog().await;
    Json(catalog.to_feed())
}

pub async fn gallery_page(
    State(state): State<AppState>,
    Path(stub): Path<String>,
) -> Result<Html<String>, AppError> {
    let Some(gallery) = state.catalog.find_gallery(&stub).await else {
        debug!(stub = %stub, "unknown gallery stub");
        return Err(AppError::not_found("gallery not found"));
    };
    let mut context = Context::new();
    context.insert("gallery", &gallery);
    templates::render(&state.templates, GALLERY, &context)
}
