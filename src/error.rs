//! # Error Taxonomy
//!
//! Typed errors for the kernel's narrow interfaces. Each variant maps to one
//! failure class so callers can react without string matching:
//!
//! | Variant              | Raised by                | Caller reaction              |
//! |----------------------|--------------------------|------------------------------|
//! | `LockAcquisition`    | lock manager             | retry policy is the caller's |
//! | `LockStateViolation` | lock release             | programming error            |
//! | `CacheExhausted`     | collection cache insert  | fail the specific insert     |
//! | `Journal`            | journal append/flush/replay | fatal to the operation    |
//! | `ReadOnly`           | write-path entry points  | report read-only to the user |
//! | `InvalidPath`        | resource path parsing    | reject the request           |
//!
//! Disk exhaustion is deliberately absent: it is a state transition of the
//! database (see `DatabaseMode`), not an error.

use std::io;
use std::path::PathBuf;

use crate::lock::{LockMode, LockType};
use crate::storage::Lsn;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to acquire {lock_type} {mode} lock on {path}: {reason}")]
    LockAcquisition {
        path: String,
        lock_type: LockType,
        mode: LockMode,
        reason: AcquireFailure,
    },

    #[error("lock state violation on {path}: {detail}")]
    LockStateViolation { path: String, detail: String },

    #[error("collection cache exhausted: all {capacity} slots are locked or pinned")]
    CacheExhausted { capacity: usize },

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("database is read-only: {reason}")]
    ReadOnly { reason: String },

    #[error("malformed resource path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl Error {
    /// True if the error is the read-only signal rather than contention or I/O.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Error::ReadOnly { .. })
    }
}

/// Why a blocking lock acquisition gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireFailure {
    #[error("interrupted while waiting")]
    Interrupted,
    #[error("timed out while waiting")]
    TimedOut,
    #[error("malformed path ({0})")]
    MalformedPath(&'static str),
    #[error("cannot upgrade a shared lock held alongside other readers")]
    UpgradeConflict,
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O failed while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("corrupt journal entry at {lsn}: {detail}")]
    Corrupt { lsn: Lsn, detail: String },

    #[error("invalid journal file header in {path:?}: {detail}")]
    InvalidHeader { path: PathBuf, detail: String },

    #[error("journal segment numbers exhausted (last segment {last})")]
    SegmentsExhausted { last: i16 },

    #[error("journal record payload of {size} bytes exceeds the maximum of {max}")]
    RecordTooLarge { size: usize, max: usize },

    #[error("journal is closed")]
    Closed,
}

impl JournalError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        JournalError::Io {
            context: context.into(),
            source,
        }
    }
}
