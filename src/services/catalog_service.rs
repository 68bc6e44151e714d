//! Builds the catalog from a bucket scan and serves it through the cache.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use futures::{StreamExt, future, stream};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

use crate::{
    models::catalog::{Catalog, Category, Gallery, Video},
    services::{
        catalog_cache::CatalogCache,
        object_keys::{MediaKind, natural_cmp, parse_key},
        object_store::{ObjectStoreClient, StoreResult, list_all},
    },
};

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of the read URLs embedded in pages and the feed.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound on in-flight signing calls during one scan.
pub const SIGN_CONCURRENCY: usize = 50;

const STUB_BYTES: usize = 3;

/// Four URL-safe characters derived from HMAC-SHA256(secret, name).
///
/// Depends only on the pair, so links survive catalog rebuilds.
pub fn gallery_stub(name: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(name.as_bytes());
    let digest = mac.finalize().into_bytes();
    URL_SAFE_NO_PAD.encode(&digest[..STUB_BYTES])
}

/// An object that made it through signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject {
    pub key: String,
    pub url: String,
}

/// Groups signed objects into the category/gallery/video hierarchy.
///
/// The result does not depend on input order: duplicate media for one base
/// name resolve to the lexicographically smallest key and every level is
/// naturally sorted.
pub fn assemble(objects: Vec<SignedObject>, secret: &str) -> Vec<Category> {
    let mut videos: HashMap<(String, String, String), Video> = HashMap::new();

    for object in &objects {
        let Some(parsed) = parse_key(&object.key) else {
            continue;
        };
        let Some(kind) = parsed.kind else {
            continue;
        };
        let video = videos
            .entry((
                parsed.category.to_string(),
                parsed.gallery.to_string(),
                parsed.base_name.to_string(),
            ))
            .or_insert_with(|| Video::new(parsed.category, parsed.gallery, parsed.base_name));

        match kind {
            MediaKind::Video => {
                if prefer(video.video_object_key.as_deref(), &object.key) {
                    video.video_object_key = Some(object.key.clone());
                    video.url = object.url.clone();
                }
            }
            MediaKind::Image => {
                if prefer(video.thumbnail_object_key.as_deref(), &object.key) {
                    video.thumbnail_object_key = Some(object.key.clone());
                    video.thumbnail_url = Some(object.url.clone());
                }
            }
        }
    }

    let mut galleries: HashMap<(String, String), Vec<Video>> = HashMap::new();
    for ((category, gallery, _), video) in videos {
        galleries.entry((category, gallery)).or_default().push(video);
    }

    let mut stubs: HashMap<String, (String, String)> = HashMap::new();
    let mut categories: HashMap<String, Vec<Gallery>> = HashMap::new();
    for ((category, name), mut videos) in galleries {
        videos.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        let stub = gallery_stub(&name, secret);
        if let Some((other_category, other_name)) = stubs.get(&stub) {
            if other_name != &name {
                warn!(
                    stub,
                    gallery = %name,
                    category = %category,
                    other_gallery = %other_name,
                    other_category = %other_category,
                    "gallery stub collision; /gallery links resolve to the first match"
                );
            }
        } else {
            stubs.insert(stub.clone(), (category.clone(), name.clone()));
        }
        categories.entry(category.clone()).or_default().push(Gallery {
            name,
            category,
            stub,
            videos,
        });
    }

    let mut categories: Vec<Category> = categories
        .into_iter()
        .map(|(name, mut galleries)| {
            galleries.sort_by(|a, b| natural_cmp(&a.name, &b.name));
            Category {
                stub: name.clone(),
                name,
                galleries,
            }
        })
        .collect();
    categories.sort_by(|a, b| natural_cmp(&a.name, &b.name));
    categories
}

fn prefer(current: Option<&str>, candidate: &str) -> bool {
    current.is_none_or(|current| candidate < current)
}

/// Scans the bucket into a [`Catalog`].
pub struct CatalogBuilder {
    store: Arc<dyn ObjectStoreClient>,
    secret: String,
    list_timeout: Duration,
    url_ttl: Duration,
    sign_concurrency: usize,
}

impl CatalogBuilder {
    pub fn new(store: Arc<dyn ObjectStoreClient>, secret: impl Into<String>) -> Self {
        Self {
            store,
            secret: secret.into(),
            list_timeout: Duration::from_secs(30),
            url_ttl: SIGNED_URL_TTL,
            sign_concurrency: SIGN_CONCURRENCY,
        }
    }

    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// Never fails: a listing error yields an empty catalog so pages still
    /// render.
    pub async fn build(&self) -> Catalog {
        let started = Instant::now();
        match self.scan().await {
            Ok(catalog) => {
                info!(
                    bucket = %self.store.bucket(),
                    categories = catalog.categories.len(),
                    galleries = catalog.galleries().count(),
                    videos = catalog.video_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "catalog built"
                );
                catalog
            }
            Err(err) => {
                error!(
                    bucket = %self.store.bucket(),
                    error = %err,
                    "bucket scan failed; serving an empty catalog"
                );
                Catalog::empty()
            }
        }
    }

    async fn scan(&self) -> StoreResult<Catalog> {
        let entries = list_all(self.store.as_ref(), self.list_timeout).await?;
        let media: Vec<String> = entries
            .into_iter()
            .filter(|entry| parse_key(&entry.key).is_some_and(|parsed| parsed.kind.is_some()))
            .map(|entry| entry.key)
            .collect();

        let signed: Vec<SignedObject> = stream::iter(media)
            .map(|key| async move {
                match self.store.signed_read_url(&key, self.url_ttl).await {
                    Ok(url) => Some(SignedObject { key, url }),
                    Err(err) => {
                        warn!(key = %key, error = %err, "could not sign object; skipping");
                        None
                    }
                }
            })
            .buffer_unordered(self.sign_concurrency)
            .filter_map(future::ready)
            .collect()
            .await;

        Ok(Catalog::new(assemble(signed, &self.secret)))
    }
}

/// Catalog reads for handlers and commands.
#[derive(Clone)]
pub struct CatalogService {
    builder: Arc<CatalogBuilder>,
    cache: CatalogCache,
}

impl CatalogService {
    pub fn new(builder: CatalogBuilder, cache: CatalogCache) -> Self {
        Self {
            builder: Arc::new(builder),
            cache,
        }
    }

    pub async fn catalog(&self) -> Arc<Catalog> {
        let builder = Arc::clone(&self.builder);
        self.cache
            .get_or_build(|| async move { builder.build().await })
            .await
    }

    pub async fn find_gallery(&self, stub: &str) -> Option<Gallery> {
        self.catalog().await.find_gallery(stub).cloned()
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }
}
