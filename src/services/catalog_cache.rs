//! Time-bounded cache around the catalog.
//!
//! Readers share one `Arc<Catalog>` until it expires or is invalidated.
//! Rebuilds are serialized so a burst of misses triggers one bucket scan,
//! and a build that overlaps an invalidation is returned to its caller but
//! not stored.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::debug;

use crate::models::catalog::Catalog;

#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<Inner>,
}

struct Inner {
    ttl: Duration,
    slot: RwLock<Option<Entry>>,
    rebuild: Mutex<()>,
    generation: AtomicU64,
}

struct Entry {
    catalog: Arc<Catalog>,
    expires_at: Instant,
    generation: u64,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                slot: RwLock::new(None),
                rebuild: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Bumped by every invalidation.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// The cached catalog, if one is present and fresh.
    pub async fn get(&self) -> Option<Arc<Catalog>> {
        let slot = self.inner.slot.read().await;
        slot.as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| Arc::clone(&entry.catalog))
    }

    /// Returns the cached catalog or runs `build` to produce one.
    ///
    /// Concurrent callers that miss wait on the same rebuild rather than
    /// each scanning the bucket.
    pub async fn get_or_build<F, Fut>(&self, build: F) -> Arc<Catalog>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Catalog>,
    {
        if let Some(catalog) = self.get().await {
            debug!("catalog cache hit");
            return catalog;
        }

        let _rebuilding = self.inner.rebuild.lock().await;
        if let Some(catalog) = self.get().await {
            debug!("catalog rebuilt by a concurrent caller");
            return catalog;
        }

        let generation = self.generation();
        let catalog = Arc::new(build().await);

        let mut slot = self.inner.slot.write().await;
        if self.generation() == generation {
            *slot = Some(Entry {
                catalog: Arc::clone(&catalog),
                expires_at: Instant::now() + self.inner.ttl,
                generation,
            });
            debug!(ttl_secs = self.inner.ttl.as_secs(), "catalog cached");
        } else {
            debug!("catalog invalidated during rebuild; result not cached");
        }
        catalog
    }

    /// Drops the cached catalog. The next read rebuilds.
    pub async fn invalidate(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.slot.write().await.take();
        debug!(generation, "catalog cache invalidated");
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        entry.generation == self.generation() && Instant::now() < entry.expires_at
    }
}
