//! # Lock Subsystem
//!
//! Multi-reader/single-writer locks over collection and document paths.
//!
//! ```text
//!  LockManager ──┬── collections: 64 shards of path -> ResourceLock
//!                └── documents:   64 shards of path -> ResourceLock
//!        │
//!        └── acquire_*() -> ManagedLock (RAII, released on drop)
//! ```
//!
//! - `path`: `ResourcePath` validation and hierarchy helpers
//! - `resource`: the fair, re-entrant lock behind each path
//! - `manager`: `LockManager`, sharded lock tables and the acquisition API
//! - `managed`: `ManagedLock` / `ManagedLocks` handles
//! - `stats`: counters and lock table snapshots

mod managed;
mod manager;
mod path;
mod resource;
mod stats;

use std::fmt;

pub use managed::{ManagedLock, ManagedLocks};
pub use manager::LockManager;
pub use path::ResourcePath;
pub use resource::LockView;
pub use stats::{LockCounters, LockStats, LockTableEntry, LockTableSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    Read,
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockMode::Read => "read",
            LockMode::Write => "write",
        })
    }
}

/// Which namespace a lock lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockType {
    Collection,
    Document,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockType::Collection => "collection",
            LockType::Document => "document",
        })
    }
}
