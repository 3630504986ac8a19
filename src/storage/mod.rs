//! # Storage Module
//!
//! Durable-state plumbing underneath the lock manager and collection cache.
//!
//! ```text
//! data_dir/
//! ├── arbordb.lck          # held exclusively while the database is open
//! └── journal/
//!     ├── 0000000003.log   # segment holding the last checkpoint
//!     └── 0000000004.log   # current segment
//! ```
//!
//! ## Module Organization
//!
//! - `lsn`: log sequence numbers and their total order
//! - `journal`: segmented write-ahead journal with checkpoints and replay
//! - `disk`: usable-space probes consulted by the sync coordinator
//! - `flock`: exclusive lock file guarding the data directory
//!
//! ## Thread Safety
//!
//! `Journal` is `Send + Sync` and serializes appends internally. `Lsn` is a
//! plain `Copy` value.

pub mod disk;
pub mod flock;
pub mod journal;
pub mod lsn;

pub use disk::{DiskSpaceProbe, FixedDiskSpace, SysinfoProbe};
pub use flock::FileLock;
pub use journal::{
    CheckpointInfo, Journal, JournalConfig, JournalRecord, JournalResult, RecordKind,
    ReplaySummary,
};
pub use lsn::{Lsn, LSN_ENCODED_SIZE, LSN_INVALID};
