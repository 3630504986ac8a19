//! # Periodic Sync
//!
//! - `coordinator`: one tick of the disk-space guard plus the minor/major
//!   sync decision
//! - `scheduler`: the OS thread that runs the coordinator every `sync-period`

mod coordinator;
mod scheduler;

pub use coordinator::{decide_sync_kind, SyncCoordinator, SyncKind, SyncOutcome};
pub use scheduler::SyncScheduler;
