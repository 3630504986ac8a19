//! # Lock Manager
//!
//! Grants shared/exclusive access to collection and document paths. Collection
//! and document locks live in separate namespaces: a read lock on collection
//! `/db/a` and a write lock on document `/db/a` never interact.
//!
//! ## Lock Entries
//!
//! Lock state is created lazily the first time a path is requested and dropped
//! again once no handle or waiter references it, so the table only holds paths
//! that are in use:
//!
//! ```text
//! shard[hash(path) % 64]
//!   └── HashMap<ResourcePath, Arc<LockEntry { lock, ref_count }>>
//!                                              │
//!      checkout (+1) on every acquire attempt ─┤
//!      checkin  (-1) on release / failed attempt, removed at 0
//! ```
//!
//! Entries are independent of the collection cache, so a path can be locked
//! before the collection it names exists (e.g. while creating it).
//!
//! ## Hierarchy
//!
//! To change a document a caller should hold at least a read lock on the
//! owning collection before taking the document's write lock. The manager does
//! not enforce the order; `acquire_document_write_in_collection` does it for
//! the common case.
//!
//! ## Failure Semantics
//!
//! Blocking acquisition waits until granted. It gives up only when
//! `interrupt_waiters` is called, when an explicit timeout passes, or when the
//! request is an impossible upgrade. Failures surface as
//! `Error::LockAcquisition` and are never retried here.
//!
//! Releasing a hold the thread does not have is a programming error: it panics
//! in debug builds and is logged at error level and returned as
//! `Error::LockStateViolation` in release builds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;

use super::managed::{ManagedLock, ManagedLocks};
use super::resource::{Granted, ResourceLock};
use super::stats::{LockStats, LockTableEntry, LockTableSnapshot};
use super::{LockMode, LockType, ResourcePath};
use crate::config::LOCK_SHARD_COUNT;
use crate::error::{AcquireFailure, Error, Result};

pub(crate) struct LockEntry {
    lock: ResourceLock,
    ref_count: AtomicU64,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            lock: ResourceLock::new(),
            ref_count: AtomicU64::new(0),
        }
    }
}

struct LockShard {
    entries: Mutex<HashMap<ResourcePath, Arc<LockEntry>>>,
}

impl LockShard {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn checkout(&self, path: &ResourcePath) -> Arc<LockEntry> {
        let mut map = self.entries.lock();
        if let Some(entry) = map.get(path) {
            entry.ref_count.fetch_add(1, Ordering::AcqRel);
            return Arc::clone(entry);
        }
        let entry = Arc::new(LockEntry::new());
        entry.ref_count.fetch_add(1, Ordering::AcqRel);
        map.insert(path.clone(), Arc::clone(&entry));
        entry
    }

    fn checkin(&self, path: &ResourcePath, entry: &LockEntry) {
        let mut map = self.entries.lock();
        if entry.ref_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            map.remove(path);
        }
    }

    fn get(&self, path: &ResourcePath) -> Option<Arc<LockEntry>> {
        self.entries.lock().get(path).cloned()
    }
}

pub struct LockManager {
    collections: Vec<LockShard>,
    documents: Vec<LockShard>,
    interrupts: AtomicU64,
    stats: LockStats,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            collections: (0..LOCK_SHARD_COUNT).map(|_| LockShard::new()).collect(),
            documents: (0..LOCK_SHARD_COUNT).map(|_| LockShard::new()).collect(),
            interrupts: AtomicU64::new(0),
            stats: LockStats::default(),
        }
    }

    fn shards(&self, lock_type: LockType) -> &[LockShard] {
        match lock_type {
            LockType::Collection => &self.collections,
            LockType::Document => &self.documents,
        }
    }

    fn shard(&self, lock_type: LockType, path: &ResourcePath) -> &LockShard {
        let hash = path
            .as_str()
            .bytes()
            .fold(0usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
        &self.shards(lock_type)[hash % LOCK_SHARD_COUNT]
    }

    fn parse(&self, lock_type: LockType, raw: &str, mode: LockMode) -> Result<ResourcePath> {
        ResourcePath::normalize(raw).map_err(|reason| Error::LockAcquisition {
            path: raw.to_string(),
            lock_type,
            mode,
            reason: AcquireFailure::MalformedPath(reason),
        })
    }

    pub fn acquire_collection_read(&self, path: &str) -> Result<ManagedLock<'_>> {
        self.acquire(LockType::Collection, path, LockMode::Read)
    }

    pub fn acquire_collection_write(&self, path: &str) -> Result<ManagedLock<'_>> {
        self.acquire(LockType::Collection, path, LockMode::Write)
    }

    pub fn acquire_document_read(&self, path: &str) -> Result<ManagedLock<'_>> {
        self.acquire(LockType::Document, path, LockMode::Read)
    }

    pub fn acquire_document_write(&self, path: &str) -> Result<ManagedLock<'_>> {
        self.acquire(LockType::Document, path, LockMode::Write)
    }

    pub fn acquire_collection_read_timeout(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<ManagedLock<'_>> {
        self.acquire_timeout(LockType::Collection, path, LockMode::Read, timeout)
    }

    pub fn acquire_collection_write_timeout(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<ManagedLock<'_>> {
        self.acquire_timeout(LockType::Collection, path, LockMode::Write, timeout)
    }

    pub fn acquire_document_read_timeout(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<ManagedLock<'_>> {
        self.acquire_timeout(LockType::Document, path, LockMode::Read, timeout)
    }

    pub fn acquire_document_write_timeout(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<ManagedLock<'_>> {
        self.acquire_timeout(LockType::Document, path, LockMode::Write, timeout)
    }

    pub fn try_acquire_collection_read(&self, path: &str) -> Result<Option<ManagedLock<'_>>> {
        self.try_acquire(LockType::Collection, path, LockMode::Read)
    }

    pub fn try_acquire_collection_write(&self, path: &str) -> Result<Option<ManagedLock<'_>>> {
        self.try_acquire(LockType::Collection, path, LockMode::Write)
    }

    pub fn try_acquire_document_read(&self, path: &str) -> Result<Option<ManagedLock<'_>>> {
        self.try_acquire(LockType::Document, path, LockMode::Read)
    }

    pub fn try_acquire_document_write(&self, path: &str) -> Result<Option<ManagedLock<'_>>> {
        self.try_acquire(LockType::Document, path, LockMode::Write)
    }

    /// Blocks until the lock is granted or the wait is interrupted.
    pub fn acquire(&self, lock_type: LockType, path: &str, mode: LockMode) -> Result<ManagedLock<'_>> {
        self.acquire_until(lock_type, path, mode, None)
    }

    /// Like `acquire`, but gives up with `AcquireFailure::TimedOut` after
    /// `timeout`.
    pub fn acquire_timeout(
        &self,
        lock_type: LockType,
        path: &str,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<ManagedLock<'_>> {
        self.acquire_until(lock_type, path, mode, Some(Instant::now() + timeout))
    }

    fn acquire_until(
        &self,
        lock_type: LockType,
        raw: &str,
        mode: LockMode,
        deadline: Option<Instant>,
    ) -> Result<ManagedLock<'_>> {
        let path = self.parse(lock_type, raw, mode)?;
        let shard = self.shard(lock_type, &path);
        let entry = shard.checkout(&path);
        let owner = thread::current().id();

        tracing::trace!(%path, %lock_type, %mode, "lock attempt");

        match entry.lock.acquire(owner, mode, deadline, &self.interrupts) {
            Ok(granted) => {
                self.stats
                    .record_acquired(mode, granted == Granted::AfterWaiting);
                tracing::trace!(%path, %lock_type, %mode, "lock acquired");
                Ok(ManagedLock::new(self, entry, lock_type, path, mode, owner))
            }
            Err(reason) => {
                shard.checkin(&path, &entry);
                match reason {
                    AcquireFailure::TimedOut => self.stats.record_timed_out(),
                    AcquireFailure::Interrupted => self.stats.record_interrupted(),
                    _ => {}
                }
                tracing::debug!(%path, %lock_type, %mode, %reason, "lock acquisition failed");
                Err(Error::LockAcquisition {
                    path: path.to_string(),
                    lock_type,
                    mode,
                    reason,
                })
            }
        }
    }

    /// Grants the lock only if that needs no waiting. `Ok(None)` means the
    /// resource is busy.
    pub fn try_acquire(
        &self,
        lock_type: LockType,
        raw: &str,
        mode: LockMode,
    ) -> Result<Option<ManagedLock<'_>>> {
        let path = self.parse(lock_type, raw, mode)?;
        let shard = self.shard(lock_type, &path);
        let entry = shard.checkout(&path);
        let owner = thread::current().id();

        match entry.lock.try_acquire(owner, mode) {
            Ok(true) => {
                self.stats.record_acquired(mode, false);
                tracing::trace!(%path, %lock_type, %mode, "lock acquired without waiting");
                Ok(Some(ManagedLock::new(self, entry, lock_type, path, mode, owner)))
            }
            Ok(false) => {
                shard.checkin(&path, &entry);
                self.stats.record_try_failed();
                Ok(None)
            }
            Err(reason) => {
                shard.checkin(&path, &entry);
                Err(Error::LockAcquisition {
                    path: path.to_string(),
                    lock_type,
                    mode,
                    reason,
                })
            }
        }
    }

    /// Takes a read lock on the owning collection, then the write lock on the
    /// document.
    pub fn acquire_document_write_in_collection(&self, document: &str) -> Result<ManagedLocks<'_>> {
        let path = self.parse(LockType::Document, document, LockMode::Write)?;
        let collection = path.parent().ok_or_else(|| Error::LockAcquisition {
            path: path.to_string(),
            lock_type: LockType::Document,
            mode: LockMode::Write,
            reason: AcquireFailure::MalformedPath("document has no owning collection"),
        })?;

        let mut locks = ManagedLocks::new();
        locks.push(self.acquire_collection_read(collection.as_str())?);
        locks.push(self.acquire_document_write(path.as_str())?);
        Ok(locks)
    }

    /// Releases a handle. Equivalent to `lock.release()`.
    pub fn release(&self, lock: ManagedLock<'_>) -> Result<()> {
        lock.release()
    }

    pub(crate) fn release_entry(
        &self,
        entry: &Arc<LockEntry>,
        lock_type: LockType,
        path: &ResourcePath,
        mode: LockMode,
        owner: ThreadId,
    ) -> Result<()> {
        let result = entry.lock.release(owner, mode);
        self.shard(lock_type, path).checkin(path, entry);

        match result {
            Ok(()) => {
                self.stats.record_released();
                tracing::trace!(%path, %lock_type, %mode, "lock released");
                Ok(())
            }
            Err(detail) => {
                self.stats.record_violation();
                tracing::error!(fatal = true, %path, %lock_type, %mode, %detail, "lock state violation");
                if cfg!(debug_assertions) && !thread::panicking() {
                    panic!("lock state violation on {} {}: {}", lock_type, path, detail);
                }
                Err(Error::LockStateViolation {
                    path: path.to_string(),
                    detail,
                })
            }
        }
    }

    /// Whether threads are waiting for this lock. Malformed paths have no
    /// waiters.
    pub fn has_queued_threads(&self, lock_type: LockType, raw: &str) -> bool {
        let Ok(path) = ResourcePath::normalize(raw) else {
            return false;
        };
        self.shard(lock_type, &path)
            .get(&path)
            .is_some_and(|entry| entry.lock.has_queued_threads())
    }

    /// True if nobody holds or waits for the lock. Non-blocking; used by the
    /// collection cache to skip entries that are in use.
    pub fn is_idle(&self, lock_type: LockType, path: &ResourcePath) -> bool {
        self.shard(lock_type, path)
            .get(path)
            .map_or(true, |entry| entry.lock.is_idle())
    }

    /// Wakes every blocked acquirer with `AcquireFailure::Interrupted`. Later
    /// acquisitions are unaffected.
    pub fn interrupt_waiters(&self) {
        self.interrupts.fetch_add(1, Ordering::AcqRel);

        let mut woken = 0usize;
        for shard in self.collections.iter().chain(self.documents.iter()) {
            let entries: Vec<Arc<LockEntry>> = shard.entries.lock().values().cloned().collect();
            for entry in entries {
                if entry.lock.has_queued_threads() {
                    woken += 1;
                }
                entry.lock.wake_all();
            }
        }
        tracing::info!(locks = woken, "interrupted lock waiters");
    }

    pub fn stats(&self) -> &LockStats {
        &self.stats
    }

    /// Number of paths with live lock state across both namespaces.
    pub fn active_entries(&self) -> usize {
        self.collections
            .iter()
            .chain(self.documents.iter())
            .map(|shard| shard.entries.lock().len())
            .sum()
    }

    /// Every lock currently held or waited on, ordered by type then path.
    pub fn snapshot(&self) -> LockTableSnapshot {
        let mut entries = Vec::new();
        for lock_type in [LockType::Collection, LockType::Document] {
            for shard in self.shards(lock_type) {
                let live: Vec<(ResourcePath, Arc<LockEntry>)> = shard
                    .entries
                    .lock()
                    .iter()
                    .map(|(path, entry)| (path.clone(), Arc::clone(entry)))
                    .collect();

                for (path, entry) in live {
                    let view = entry.lock.view();
                    if !view.is_held() && view.queued_readers + view.queued_writers == 0 {
                        continue;
                    }
                    entries.push(LockTableEntry {
                        lock_type,
                        path,
                        writer: view.writer,
                        write_holds: view.write_holds,
                        readers: view.readers,
                        queued_readers: view.queued_readers,
                        queued_writers: view.queued_writers,
                    });
                }
            }
        }
        entries.sort_by(|a, b| (a.lock_type, &a.path).cmp(&(b.lock_type, &b.path)));
        LockTableSnapshot { entries }
    }
}
