//! # Managed Lock Handles
//!
//! A `ManagedLock` is proof of one successful acquisition. Dropping it releases
//! the hold, so every exit path (early return, `?`, panic) gives the lock back.
//! `release` does the same but reports a state violation to the caller instead
//! of only logging it.
//!
//! A handle remembers the thread that acquired it, so it may be released from
//! another thread without being mistaken for a foreign release.
//!
//! `ManagedLocks` groups handles taken in hierarchy order (collection before
//! document) and gives them back in reverse:
//!
//! ```text
//! acquire:  /db/books (read)  ->  /db/books/a.xml (write)
//! release:  /db/books/a.xml   ->  /db/books
//! ```

use std::sync::Arc;
use std::thread::ThreadId;

use smallvec::SmallVec;

use super::manager::{LockEntry, LockManager};
use super::{LockMode, LockType, ResourcePath};
use crate::error::{Error, Result};

#[must_use = "dropping a ManagedLock releases it immediately"]
pub struct ManagedLock<'a> {
    manager: &'a LockManager,
    entry: Arc<LockEntry>,
    lock_type: LockType,
    path: ResourcePath,
    mode: LockMode,
    owner: ThreadId,
    released: bool,
}

impl<'a> ManagedLock<'a> {
    pub(crate) fn new(
        manager: &'a LockManager,
        entry: Arc<LockEntry>,
        lock_type: LockType,
        path: ResourcePath,
        mode: LockMode,
        owner: ThreadId,
    ) -> Self {
        Self {
            manager,
            entry,
            lock_type,
            path,
            mode,
            owner,
            released: false,
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn release(mut self) -> Result<()> {
        self.release_once()
    }

    fn release_once(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.manager.release_entry(
            &self.entry,
            self.lock_type,
            &self.path,
            self.mode,
            self.owner,
        )
    }
}

impl Drop for ManagedLock<'_> {
    fn drop(&mut self) {
        // violations are already logged by the manager
        let _ = self.release_once();
    }
}

impl std::fmt::Debug for ManagedLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedLock")
            .field("lock_type", &self.lock_type)
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Handles released in reverse acquisition order.
#[derive(Debug, Default)]
#[must_use = "dropping ManagedLocks releases every lock in it"]
pub struct ManagedLocks<'a> {
    locks: SmallVec<[ManagedLock<'a>; 4]>,
}

impl<'a> ManagedLocks<'a> {
    pub fn new() -> Self {
        Self {
            locks: SmallVec::new(),
        }
    }

    pub fn push(&mut self, lock: ManagedLock<'a>) {
        self.locks.push(lock);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedLock<'a>> {
        self.locks.iter()
    }

    /// Releases every handle, newest first. All handles are released even if
    /// one fails; the first failure is returned.
    pub fn release(mut self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        while let Some(lock) = self.locks.pop() {
            if let Err(e) = lock.release() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ManagedLocks<'_> {
    fn drop(&mut self) {
        while let Some(lock) = self.locks.pop() {
            drop(lock);
        }
    }
}

impl<'a> FromIterator<ManagedLock<'a>> for ManagedLocks<'a> {
    fn from_iter<I: IntoIterator<Item = ManagedLock<'a>>>(iter: I) -> Self {
        Self {
            locks: iter.into_iter().collect(),
        }
    }
}
