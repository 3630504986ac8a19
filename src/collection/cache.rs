//! # Reference-Density Collection Cache
//!
//! A fixed number of slots holding `Collection` objects, indexed two ways:
//!
//! ```text
//! names: ResourcePath -> key      keys: key -> slot
//!   /db/books -> 17                 17 -> 2
//!
//! slots: [ A | - | B(17) | C ]      (- = empty)
//! ```
//!
//! Every non-empty slot is reachable through both indices, and nothing else is.
//!
//! ## Reference Density
//!
//! The cache keeps one accumulator that grows by one on every hit (and by the
//! initial reference count on every insert). Each slot records its own
//! reference count and the accumulator value at its last access. Eviction
//! picks the slot with the lowest
//!
//! ```text
//! density = ref_count / (accumulator - timestamp)
//! ```
//!
//! i.e. the entry used least relative to how long ago it was last used. The
//! most recently touched entry has a zero denominator and infinite density.
//! The accumulator is only meaningful relative to slot timestamps; it is never
//! reset.
//!
//! ## Eviction
//!
//! An empty slot is always taken first. Otherwise every occupied slot is
//! scanned once; a slot is a candidate only if its collection lock is
//! completely idle (checked without blocking) and the collection allows
//! unloading. The victim's configuration is invalidated, it leaves both
//! indices and is synced before its slot is reused. With no candidate the
//! insert fails with `Error::CacheExhausted` and the table is unchanged.
//!
//! ## Thread Safety
//!
//! None. Methods take `&mut self`; the owning `CollectionStore` serializes
//! access behind one mutex.

use std::sync::Arc;

use hashbrown::HashMap;

use super::Collection;
use crate::config::MIN_COLLECTION_CACHE_SIZE;
use crate::error::{Error, Result};
use crate::lock::{LockManager, LockType, ResourcePath};

/// External cache of per-collection configuration that must forget a
/// collection when it leaves the collection cache.
pub trait ConfigurationCache: Send + Sync {
    fn invalidate(&self, path: &ResourcePath);
}

/// A configuration cache that holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfigurationCache;

impl ConfigurationCache for NoConfigurationCache {
    fn invalidate(&self, _path: &ResourcePath) {}
}

#[derive(Debug)]
struct Slot {
    collection: Arc<Collection>,
    ref_count: u64,
    timestamp: u64,
}

impl Slot {
    fn density(&self, accumulator: u64) -> f64 {
        let age = accumulator.saturating_sub(self.timestamp);
        if age == 0 {
            return f64::INFINITY;
        }
        self.ref_count as f64 / age as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub exhausted: u64,
}

pub struct CollectionCache {
    slots: Vec<Option<Slot>>,
    names: HashMap<ResourcePath, u64>,
    keys: HashMap<u64, usize>,
    accumulator: u64,
    locks: Arc<LockManager>,
    configuration: Arc<dyn ConfigurationCache>,
    statistics: CacheStatistics,
}

impl CollectionCache {
    /// Capacity is raised to `MIN_COLLECTION_CACHE_SIZE` if smaller.
    pub fn new(
        capacity: usize,
        locks: Arc<LockManager>,
        configuration: Arc<dyn ConfigurationCache>,
    ) -> Self {
        let capacity = capacity.max(MIN_COLLECTION_CACHE_SIZE);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            names: HashMap::with_capacity(capacity),
            keys: HashMap::with_capacity(capacity),
            accumulator: 0,
            locks,
            configuration,
            statistics: CacheStatistics::default(),
        }
    }

    pub fn add(&mut self, collection: Arc<Collection>) -> Result<Option<Arc<Collection>>> {
        self.add_with_refs(collection, 1)
    }

    /// Inserts `collection`, or replaces the collection cached under the same
    /// key. Returns the collection evicted to make room, if any.
    pub fn add_with_refs(
        &mut self,
        collection: Arc<Collection>,
        initial_refs: u64,
    ) -> Result<Option<Arc<Collection>>> {
        let key = collection.key();
        let path = collection.path().clone();

        if let Some(&stale_key) = self.names.get(&path) {
            if stale_key != key {
                self.remove_key(stale_key);
            }
        }

        self.accumulator += initial_refs;

        if let Some(&index) = self.keys.get(&key) {
            if let Some(slot) = self.slots[index].as_mut() {
                if slot.collection.path() != &path {
                    self.names.remove(slot.collection.path());
                }
                slot.collection = collection;
                slot.ref_count += initial_refs;
                slot.timestamp = self.accumulator;
                self.names.insert(path, key);
                return Ok(None);
            }
        }

        let (index, evicted) = match self.slots.iter().position(Option::is_none) {
            Some(index) => (index, None),
            None => match self.select_victim() {
                Ok(index) => (index, self.evict_slot(index)),
                Err(e) => {
                    self.accumulator -= initial_refs;
                    return Err(e);
                }
            },
        };

        self.slots[index] = Some(Slot {
            collection,
            ref_count: initial_refs,
            timestamp: self.accumulator,
        });
        self.keys.insert(key, index);
        self.names.insert(path, key);
        Ok(evicted)
    }

    pub fn get(&mut self, key: u64) -> Option<Arc<Collection>> {
        let Some(&index) = self.keys.get(&key) else {
            self.statistics.misses += 1;
            return None;
        };

        self.accumulator += 1;
        let slot = self.slots[index].as_mut()?;
        slot.ref_count += 1;
        slot.timestamp = self.accumulator;
        self.statistics.hits += 1;
        Some(Arc::clone(&slot.collection))
    }

    pub fn get_by_name(&mut self, path: &ResourcePath) -> Option<Arc<Collection>> {
        match self.names.get(path) {
            Some(&key) => self.get(key),
            None => {
                self.statistics.misses += 1;
                None
            }
        }
    }

    /// Drops `collection` from the cache (e.g. after delete or rename) and
    /// invalidates its configuration.
    pub fn remove(&mut self, collection: &Collection) -> Option<Arc<Collection>> {
        self.remove_key(collection.key())
    }

    pub fn remove_by_name(&mut self, path: &ResourcePath) -> Option<Arc<Collection>> {
        let key = *self.names.get(path)?;
        self.remove_key(key)
    }

    fn remove_key(&mut self, key: u64) -> Option<Arc<Collection>> {
        let index = self.keys.remove(&key)?;
        let slot = self.slots[index].take()?;
        self.names.remove(slot.collection.path());
        self.configuration.invalidate(slot.collection.path());
        Some(slot.collection)
    }

    fn select_victim(&mut self) -> Result<usize> {
        let mut victim: Option<(usize, f64)> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else {
                return Ok(index);
            };

            let density = slot.density(self.accumulator);
            let collection = &slot.collection;
            if !self.locks.is_idle(LockType::Collection, collection.path()) {
                continue;
            }
            if !collection.allow_unload() {
                continue;
            }
            if victim.map_or(true, |(_, min)| density < min) {
                victim = Some((index, density));
            }
        }

        match victim {
            Some((index, _)) => Ok(index),
            None => {
                self.statistics.exhausted += 1;
                tracing::warn!(capacity = self.slots.len(), "collection cache exhausted");
                Err(Error::CacheExhausted {
                    capacity: self.slots.len(),
                })
            }
        }
    }

    fn evict_slot(&mut self, index: usize) -> Option<Arc<Collection>> {
        let slot = self.slots[index].take()?;
        let victim = slot.collection;

        self.configuration.invalidate(victim.path());
        self.keys.remove(&victim.key());
        self.names.remove(victim.path());
        victim.sync();

        self.statistics.evictions += 1;
        tracing::debug!(
            path = %victim.path(),
            key = victim.key(),
            refs = slot.ref_count,
            "evicted collection"
        );
        Some(victim)
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.keys.contains_key(&key)
    }

    pub fn contains_name(&self, path: &ResourcePath) -> bool {
        self.names.contains_key(path)
    }

    /// Reference count of a cached collection, without counting as an access.
    pub fn ref_count(&self, key: u64) -> Option<u64> {
        let index = *self.keys.get(&key)?;
        self.slots[index].as_ref().map(|slot| slot.ref_count)
    }

    /// Current reference density, without counting as an access.
    pub fn density(&self, key: u64) -> Option<f64> {
        let index = *self.keys.get(&key)?;
        self.slots[index]
            .as_ref()
            .map(|slot| slot.density(self.accumulator))
    }

    pub fn accumulator(&self) -> u64 {
        self.accumulator
    }

    /// Cached collections in slot order, without counting as accesses.
    pub fn collections(&self) -> impl Iterator<Item = &Arc<Collection>> {
        self.slots.iter().flatten().map(|slot| &slot.collection)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.statistics
    }
}
