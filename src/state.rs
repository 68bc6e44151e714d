use anyhow::{Context, Result};
use std::sync::Arc;
use tera::Tera;
use tracing::warn;

use crate::{
    config::AppConfig,
    services::{
        catalog_cache::CatalogCache,
        catalog_service::{CatalogBuilder, CatalogService},
        frame_extractor::{FfmpegExtractor, FrameExtractor},
        object_store::{ObjectStoreClient, connect},
        poster_service::{PosterLookup, PosterService, TmdbClient},
        thumbnail_service::{ThumbnailOptions, ThumbnailService},
    },
    templates,
};

/// Shared state handed to every handler and command.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: CatalogService,
    pub thumbnails: ThumbnailService,
    pub posters: PosterService,
    pub templates: Arc<Tera>,
}

impl AppState {
    /// Wires the production collaborators: the configured bucket, ffmpeg
    /// and TMDb.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store = connect(config.storage_provider, &config.bucket_name)
            .with_context(|| format!("connecting to bucket `{}`", config.bucket_name))?;
        let extractor = Arc::new(FfmpegExtractor::new(
            config.ffmpeg_path.clone(),
            config.thumbnail_quality,
            config.extract_timeout,
        ));
        let lookup: Option<Arc<dyn PosterLookup>> = match &config.tmdb_api_key {
            Some(key) => Some(Arc::new(
                TmdbClient::new(key.clone()).context("building TMDb client")?,
            )),
            None => {
                warn!("TMDB_API_KEY not set; movie poster lookup is disabled");
                None
            }
        };
        Self::new(config, store, extractor, lookup)
    }

    /// Builds the services around explicit collaborators.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ObjectStoreClient>,
        extractor: Arc<dyn FrameExtractor>,
        lookup: Option<Arc<dyn PosterLookup>>,
    ) -> Result<Self> {
        let cache = CatalogCache::new(config.cache_ttl);
        let builder = CatalogBuilder::new(Arc::clone(&store), config.secret_key.clone())
            .with_list_timeout(config.list_timeout);
        let catalog = CatalogService::new(builder, cache.clone());
        let thumbnails = ThumbnailService::new(
            Arc::clone(&store),
            extractor,
            cache.clone(),
            ThumbnailOptions {
                scratch_root: config.scratch_dir.clone(),
                bulk_concurrency: config.bulk_concurrency,
                list_timeout: config.list_timeout,
            },
        );
        let posters = PosterService::new(store, lookup, cache);
        let templates = templates::load().context("loading page templates")?;

        Ok(Self {
            config: Arc::new(config),
            catalog,
            thumbnails,
            posters,
            templates: Arc::new(templates),
        })
    }
}
