//! # arbordb - Concurrency and Durability Core for a Hierarchical Document Store
//!
//! arbordb is the kernel underneath a document database that stores XML-like
//! documents in a tree of collections. It provides the pieces every broker
//! (worker thread) leans on:
//!
//! - **Hierarchical locking**: fair, re-entrant reader/writer locks keyed by
//!   collection and document path, handed out as scoped `ManagedLock`s
//! - **Collection cache**: a bounded cache that evicts by reference density and
//!   never evicts a collection somebody holds locked
//! - **Write-ahead journal**: LSN-ordered records in checksummed segment files,
//!   with checkpoints, group commit and crash recovery
//! - **Periodic sync**: minor and major syncs plus a disk-space guard that puts
//!   the database into read-only mode before the disk fills up
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use arbordb::{Database, JournalRecord, SysinfoProbe};
//!
//! let db = Arc::new(Database::builder().path("./data").open()?);
//! let mut sync = db.start_sync(Arc::new(SysinfoProbe::new()))?;
//!
//! let _collection = db.locks().acquire_collection_read("/db/library")?;
//! let _document = db.locks().acquire_document_write("/db/library/book.xml")?;
//!
//! let txn = db.begin()?;
//! db.journal_mutation(&JournalRecord::operation(0x10, txn, b"store".to_vec()))?;
//! db.commit(txn)?;
//!
//! sync.shutdown();
//! db.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           Database (broker pool handle)       │
//! ├──────────────────────┬───────────────────────┤
//! │  SyncScheduler ──►   │  SyncCoordinator       │
//! │                      │  (disk guard, min/maj) │
//! ├──────────────────────┼───────────────────────┤
//! │   CollectionStore    │      LockManager       │
//! │   └ CollectionCache ─┼─► idle probes          │
//! ├──────────────────────┴───────────────────────┤
//! │        Journal (segments, LSNs, replay)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! data_dir/
//! ├── arbordb.lck          # exclusive lock held while the database is open
//! └── journal/
//!     ├── 0000000003.log   # segment holding the last checkpoint
//!     └── 0000000004.log   # current segment
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: constants and `DatabaseConfig`
//! - [`error`]: the typed error taxonomy
//! - [`storage`]: LSNs, the journal, disk-space probes
//! - [`lock`]: resource paths, the lock manager and managed handles
//! - [`collection`]: collection objects, the cache and the store
//! - [`sync`]: the sync coordinator and its scheduler thread
//! - [`database`]: the owning `Database` handle, recovery and the builder
//!
//! ## Logging
//!
//! Everything logs through `tracing`. The library never installs a
//! subscriber; the embedding application decides where events go.

#[macro_use]
mod macros;

pub mod collection;
pub mod config;
pub mod database;
pub mod error;
pub mod lock;
pub mod storage;
pub mod sync;

pub use collection::{Collection, CollectionCache, CollectionStore, ConfigurationCache};
pub use config::DatabaseConfig;
pub use database::{Database, DatabaseBuilder, DatabaseMode, RecoveryInfo, SyncReport};
pub use error::{AcquireFailure, Error, JournalError, Result};
pub use lock::{LockManager, LockMode, LockType, ManagedLock, ManagedLocks, ResourcePath};
pub use storage::{
    DiskSpaceProbe, FixedDiskSpace, Journal, JournalConfig, JournalRecord, Lsn, RecordKind,
    SysinfoProbe, LSN_INVALID,
};
pub use sync::{SyncCoordinator, SyncKind, SyncOutcome, SyncScheduler};
