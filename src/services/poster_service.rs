//! Movie posters as thumbnails.
//!
//! Titles are cleaned of release-year and quality tags, searched against a
//! movie metadata service, and the best match's poster is stored where the
//! extracted thumbnail would go.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::{
    models::poster::{MoviePosterResult, PosterCandidate},
    services::{
        catalog_cache::CatalogCache,
        object_keys::{file_stem, thumbnail_key},
        object_store::{ObjectStoreClient, StoreError},
        progress::{NoProgress, ProgressReporter},
        thumbnail_service::{THUMBNAIL_CONTENT_TYPE, remove_previous_thumbnail},
    },
};

pub const TMDB_SEARCH_URL: &str = "https://api.themoviedb.org/3/search/movie";
pub const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum PosterError {
    #[error("TMDB_API_KEY is not configured")]
    MissingApiKey,
    #[error("movie title is empty")]
    EmptyTitle,
    #[error("no movies found for `{0}`")]
    NoResults(String),
    #[error("`{0}` has no poster image")]
    NoPoster(String),
    #[error("poster service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("poster service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosterSize {
    /// Stored as the thumbnail.
    Full,
    /// Shown in search results.
    Preview,
}

impl PosterSize {
    pub fn token(self) -> &'static str {
        match self {
            PosterSize::Full => "w500",
            PosterSize::Preview => "w185",
        }
    }
}

#[async_trait]
pub trait PosterLookup: Send + Sync {
    async fn search(&self, title: &str) -> Result<Vec<PosterCandidate>, PosterError>;

    fn image_url(&self, poster_path: &str, size: PosterSize) -> String;

    async fn fetch_image(&self, poster_path: &str, size: PosterSize) -> Result<Bytes, PosterError>;
}

/// Cuts a title at the first `(` or `[`: `"Heat (1995) [1080p]"` becomes
/// `"Heat"`.
pub fn clean_title(raw: &str) -> &str {
    let cut = raw.find(['(', '[']).unwrap_or(raw.len());
    raw[..cut].trim()
}

/// Exact title match (ignoring case), then the first title containing the
/// query, then whatever the service ranked first.
pub fn best_match<'a>(candidates: &'a [PosterCandidate], title: &str) -> Option<&'a PosterCandidate> {
    let wanted = title.to_lowercase();
    candidates
        .iter()
        .find(|candidate| candidate.title.to_lowercase() == wanted)
        .or_else(|| {
            candidates
                .iter()
                .find(|candidate| candidate.title.to_lowercase().contains(&wanted))
        })
        .or_else(|| candidates.first())
}

fn release_year(date: Option<&str>) -> Option<String> {
    date.and_then(|date| date.get(..4))
        .filter(|year| year.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// TMDb's movie search and image CDN.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    http: reqwest::Client,
    api_key: String,
    search_url: String,
    image_base: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    #[serde(default)]
    title: String,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, PosterError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            search_url: TMDB_SEARCH_URL.to_string(),
            image_base: TMDB_IMAGE_BASE.to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PosterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let cut = (0..=ERROR_BODY_LIMIT)
                .rev()
                .find(|idx| body.is_char_boundary(*idx))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(PosterError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PosterLookup for TmdbClient {
    async fn search(&self, title: &str) -> Result<Vec<PosterCandidate>, PosterError> {
        let response = self
            .http
            .get(&self.search_url)
            .query(&[("api_key", self.api_key.as_str()), ("query", title)])
            .send()
            .await?;
        let parsed: SearchResponse = Self::check(response).await?.json().await?;
        debug!(query = %title, results = parsed.results.len(), "poster search finished");
        Ok(parsed
            .results
            .into_iter()
            .map(|movie| PosterCandidate {
                title: movie.title,
                poster_path: movie.poster_path.filter(|path| !path.is_empty()),
                release_date: movie.release_date,
            })
            .collect())
    }

    fn image_url(&self, poster_path: &str, size: PosterSize) -> String {
        format!("{}/{}{}", self.image_base, size.token(), poster_path)
    }

    async fn fetch_image(&self, poster_path: &str, size: PosterSize) -> Result<Bytes, PosterError> {
        let response = self
            .http
            .get(self.image_url(poster_path, size))
            .send()
            .await?;
        Ok(Self::check(response).await?.bytes().await?)
    }
}

#[derive(Clone)]
pub struct PosterService {
    store: Arc<dyn ObjectStoreClient>,
    lookup: Option<Arc<dyn PosterLookup>>,
    cache: CatalogCache,
}

impl PosterService {
    /// `lookup` is `None` when no API key is configured; every operation
    /// then fails with [`PosterError::MissingApiKey`].
    pub fn new(
        store: Arc<dyn ObjectStoreClient>,
        lookup: Option<Arc<dyn PosterLookup>>,
        cache: CatalogCache,
    ) -> Self {
        Self {
            store,
            lookup,
            cache,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lookup.is_some()
    }

    fn lookup(&self) -> Result<&dyn PosterLookup, PosterError> {
        self.lookup.as_deref().ok_or(PosterError::MissingApiKey)
    }

    /// Candidates for the admin picker, in the service's ranking order.
    pub async fn search_posters(&self, raw_title: &str) -> Result<Vec<MoviePosterResult>, PosterError> {
        let lookup = self.lookup()?;
        let title = clean_title(raw_title);
        if title.is_empty() {
            return Err(PosterError::EmptyTitle);
        }
        let candidates = lookup.search(title).await?;
        Ok(candidates
            .into_iter()
            .filter_map(|candidate| {
                let path = candidate.poster_path?;
                Some(MoviePosterResult {
                    year: release_year(candidate.release_date.as_deref()),
                    poster_url: lookup.image_url(&path, PosterSize::Full),
                    thumbnail_url: lookup.image_url(&path, PosterSize::Preview),
                    title: candidate.title,
                })
            })
            .collect())
    }

    pub async fn fetch_movie_poster(
        &self,
        video_key: &str,
        raw_title: Option<&str>,
    ) -> Result<(), PosterError> {
        self.fetch_movie_poster_with_progress(video_key, raw_title, &NoProgress)
            .await
    }

    /// Replaces the thumbnail of `video_key` with a movie poster.
    ///
    /// A blank title searches by the video's filename.
    pub async fn fetch_movie_poster_with_progress(
        &self,
        video_key: &str,
        raw_title: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PosterError> {
        let span = info_span!("poster", run_id = %Uuid::new_v4(), key = %video_key);
        async move {
            progress.report("Getting API key", 5);
            let lookup = self.lookup()?;

            let source = match raw_title.map(str::trim) {
                Some(title) if !title.is_empty() => title,
                _ => file_stem(video_key),
            };
            let title = clean_title(source);
            if title.is_empty() {
                return Err(PosterError::EmptyTitle);
            }

            progress.report("Searching for movie", 15);
            let candidates = lookup.search(title).await?;
            let chosen = best_match(&candidates, title)
                .ok_or_else(|| PosterError::NoResults(title.to_string()))?;
            let poster_path = chosen
                .poster_path
                .as_deref()
                .ok_or_else(|| PosterError::NoPoster(chosen.title.clone()))?;
            info!(query = %title, matched = %chosen.title, "poster match selected");

            progress.report("Downloading poster", 40);
            let image = lookup.fetch_image(poster_path, PosterSize::Full).await?;

            progress.report("Uploading to storage", 85);
            let thumb_key = thumbnail_key(video_key);
            remove_previous_thumbnail(self.store.as_ref(), &self.cache, &thumb_key).await;
            self.store
                .write_object(&thumb_key, image, THUMBNAIL_CONTENT_TYPE)
                .await?;

            progress.report("Clearing cache", 95);
            self.cache.invalidate().await;

            progress.report("Complete", 100);
            info!(thumbnail = %thumb_key, "poster stored as thumbnail");
            Ok(())
        }
        .instrument(span)
        .await
    }
}
