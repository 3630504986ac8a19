//! In-memory collection metadata held by the collection cache.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::lock::ResourcePath;

/// A cached collection. Identified by both its path and a numeric key that is
/// unique for the lifetime of the store.
///
/// The lock guarding a collection lives in the `LockManager` under
/// `LockType::Collection` and the same path, so it exists independently of
/// cache residency.
#[derive(Debug)]
pub struct Collection {
    key: u64,
    path: ResourcePath,
    allow_unload: AtomicBool,
    dirty: AtomicBool,
    syncs: AtomicU64,
}

impl Collection {
    pub fn new(key: u64, path: ResourcePath) -> Self {
        Self {
            key,
            path,
            allow_unload: AtomicBool::new(true),
            dirty: AtomicBool::new(false),
            syncs: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Whether the cache may evict this collection.
    pub fn allow_unload(&self) -> bool {
        self.allow_unload.load(Ordering::Acquire)
    }

    pub fn set_allow_unload(&self, allow: bool) {
        self.allow_unload.store(allow, Ordering::Release);
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flushes pending in-memory state. Returns true if there was any.
    pub fn sync(&self) -> bool {
        let was_dirty = self.dirty.swap(false, Ordering::AcqRel);
        if was_dirty {
            self.syncs.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path = %self.path, key = self.key, "collection synced");
        }
        was_dirty
    }

    /// Number of syncs that flushed pending state.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }
}
