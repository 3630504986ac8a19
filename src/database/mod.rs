//! # Database Module
//!
//! `Database` is the owning handle of everything an open database needs: the
//! lock manager, the collection store, the journal and the read/write mode.
//! Worker threads ("brokers") share it through an `Arc` and the sync
//! scheduler holds one more reference.
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   brokers ──────►│ Database                     │◄────── SyncScheduler
//!                  │  ├── LockManager (Arc)       │          │
//!                  │  ├── CollectionStore ────────┼── probes │
//!                  │  ├── Journal                 │  locks   │
//!                  │  └── mode: RwLock<Mode>      │◄─────────┘
//!                  └──────────────────────────────┘  set_read_only / sync
//! ```
//!
//! ## Lifecycle
//!
//! 1. `Database::open` (or `DatabaseBuilder::open`) validates the config,
//!    opens the journal and runs recovery before returning
//! 2. brokers lock resources, fetch collections and journal mutations through
//!    `journal_mutation`, which refuses to write in read-only mode
//! 3. the sync coordinator periodically calls `sync(Minor | Major)` and may
//!    switch the database to read-only when the disk fills up
//! 4. `close` interrupts lock waiters, flushes collections and shuts the
//!    journal down with a clean checkpoint
//!
//! ## Read-Only Mode
//!
//! The switch to read-only is one-way. Nothing in the process switches back;
//! an operator restarts the database once space has been freed.

mod builder;
#[allow(clippy::module_inception)]
mod database;
mod recovery;

pub use builder::DatabaseBuilder;
pub use database::{Database, SyncReport};
pub(crate) use database::now_millis;
pub use recovery::RecoveryInfo;

/// Database operating mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseMode {
    /// Normal mode, every operation is available.
    ReadWrite,
    /// Writes are refused with `Error::ReadOnly` carrying `reason`.
    ReadOnly { reason: String },
}

impl DatabaseMode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, DatabaseMode::ReadOnly { .. })
    }
}
