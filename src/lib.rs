//! Secret-gated video gallery served from a cloud bucket.
//!
//! Objects laid out as `Category/Gallery/File` are scanned into a cached
//! catalog, rendered as HTML pages and a JSON feed, and maintained through
//! an admin surface that extracts thumbnails with ffmpeg or pulls movie
//! posters from TMDb.

pub mod commands;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod templates;
