//! # Collection Store
//!
//! Owner of the collection cache. The cache does no locking of its own; the
//! store serializes every call into it behind one `parking_lot::Mutex` and
//! mints collection keys.
//!
//! Lock order: a caller may hold collection or document locks from the
//! `LockManager` when calling into the store. The store never blocks on those
//! locks while holding its mutex; eviction only probes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::{CacheStatistics, CollectionCache, ConfigurationCache};
use super::Collection;
use crate::error::Result;
use crate::lock::{LockManager, ResourcePath};

pub struct CollectionStore {
    cache: Mutex<CollectionCache>,
    next_key: AtomicU64,
}

impl CollectionStore {
    pub fn new(
        capacity: usize,
        locks: Arc<LockManager>,
        configuration: Arc<dyn ConfigurationCache>,
    ) -> Self {
        Self {
            cache: Mutex::new(CollectionCache::new(capacity, locks, configuration)),
            next_key: AtomicU64::new(1),
        }
    }

    pub fn get(&self, path: &ResourcePath) -> Option<Arc<Collection>> {
        self.cache.lock().get_by_name(path)
    }

    pub fn get_by_key(&self, key: u64) -> Option<Arc<Collection>> {
        self.cache.lock().get(key)
    }

    /// Returns the cached collection for `path`, creating and caching a new
    /// one if there is none. Fails with `CacheExhausted` if a new collection
    /// is needed and nothing can be evicted.
    pub fn get_or_create(&self, path: &ResourcePath) -> Result<Arc<Collection>> {
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.get_by_name(path) {
            return Ok(existing);
        }

        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let collection = Arc::new(Collection::new(key, path.clone()));
        cache.add(Arc::clone(&collection))?;
        tracing::debug!(%path, key, "cached new collection");
        Ok(collection)
    }

    /// Caches an existing collection, e.g. one loaded from disk.
    pub fn insert(&self, collection: Arc<Collection>) -> Result<Option<Arc<Collection>>> {
        self.next_key
            .fetch_max(collection.key().saturating_add(1), Ordering::Relaxed);
        self.cache.lock().add(collection)
    }

    /// Forgets a deleted or renamed collection.
    pub fn remove(&self, path: &ResourcePath) -> Option<Arc<Collection>> {
        self.cache.lock().remove_by_name(path)
    }

    /// Syncs every cached collection with pending state. Returns how many
    /// were flushed.
    pub fn sync_dirty(&self) -> usize {
        let cache = self.cache.lock();
        cache.collections().filter(|c| c.sync()).count()
    }

    pub fn dirty_count(&self) -> usize {
        self.cache
            .lock()
            .collections()
            .filter(|c| c.is_dirty())
            .count()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().capacity()
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.cache.lock().statistics()
    }

    /// Runs `f` with exclusive access to the cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut CollectionCache) -> R) -> R {
        f(&mut self.cache.lock())
    }
}
