use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

use crate::services::{
    object_store::StoreError,
    poster_service::PosterError,
    thumbnail_service::BulkError,
};

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self.message, "request failed");
        }
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            StoreError::Backend(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<BulkError> for AppError {
    fn from(err: BulkError) -> Self {
        match err {
            BulkError::Precondition(err) => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{}: {}", err.step, err.source),
            ),
            BulkError::Listing(StoreError::Timeout(timeout)) => AppError::new(
                StatusCode::GATEWAY_TIMEOUT,
                format!("bucket listing timed out after {timeout:?}"),
            ),
            listing => AppError::internal(listing.to_string()),
        }
    }
}

impl From<PosterError> for AppError {
    fn from(err: PosterError) -> Self {
        let status = match &err {
            PosterError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
            PosterError::EmptyTitle => StatusCode::BAD_REQUEST,
            PosterError::NoResults(_) | PosterError::NoPoster(_) => StatusCode::NOT_FOUND,
            PosterError::Http(_) | PosterError::Status { .. } => StatusCode::BAD_GATEWAY,
            PosterError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
