//! # Sync Coordinator
//!
//! One tick of periodic durability work:
//!
//! ```text
//!   probe usable space on the data dir's volume
//!       │
//!       ├── known and below disk-space-min ──► switch database to read-only
//!       │                                       (fatal log on the transition,
//!       │                                        warn on every later tick)
//!       ▼
//!   now - last major sync > major-sync-period ?
//!       ├── yes ──► major sync: flush collections, checkpoint the journal
//!       └── no  ──► minor sync: flush collections and the journal
//! ```
//!
//! A probe that cannot tell (`None`) counts as enough space. The read-only
//! switch is one-way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;

use crate::config::{DatabaseConfig, BYTES_PER_MB};
use crate::database::{now_millis, Database, SyncReport};
use crate::error::Result;
use crate::storage::DiskSpaceProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    /// Flush buffers without a checkpoint.
    Minor,
    /// Full checkpoint.
    Major,
}

/// Major once strictly more than `period` has passed since the last major sync.
pub fn decide_sync_kind(now_ms: u64, last_major_ms: u64, period: Duration) -> SyncKind {
    let elapsed = u128::from(now_ms.saturating_sub(last_major_ms));
    if elapsed > period.as_millis() {
        SyncKind::Major
    } else {
        SyncKind::Minor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub report: SyncReport,
    /// Usable bytes reported by the probe, `None` if unknown.
    pub usable_space: Option<u64>,
    /// True only on the tick that switched the database to read-only.
    pub switched_read_only: bool,
}

impl SyncOutcome {
    pub fn kind(&self) -> SyncKind {
        self.report.kind
    }
}

pub struct SyncCoordinator {
    data_dir: PathBuf,
    min_free_bytes: u64,
    probe: Arc<dyn DiskSpaceProbe>,
}

impl SyncCoordinator {
    /// Resolves the data directory and reports the usable space on it. Fails
    /// if the directory cannot be resolved at all.
    pub fn configure(
        config: &DatabaseConfig,
        probe: Arc<dyn DiskSpaceProbe>,
    ) -> eyre::Result<Self> {
        let data_dir = config.data_dir.canonicalize().wrap_err_with(|| {
            format!("cannot resolve data directory {}", config.data_dir.display())
        })?;

        match probe.usable_space(&data_dir) {
            Some(usable) => tracing::info!(
                data_dir = %data_dir.display(),
                usable_mb = usable / BYTES_PER_MB,
                min_mb = config.disk_space_min_mb,
                "usable disk space"
            ),
            None => tracing::info!(
                data_dir = %data_dir.display(),
                min_mb = config.disk_space_min_mb,
                "usable disk space cannot be determined, disk guard is inactive"
            ),
        }

        Ok(Self {
            data_dir,
            min_free_bytes: config.disk_space_min_bytes(),
            probe,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_bytes
    }

    /// Runs one tick against `db`.
    pub fn execute(&self, db: &Database) -> Result<SyncOutcome> {
        let usable_space = self.probe.usable_space(&self.data_dir);
        let switched_read_only = self.check_disk_space(db, usable_space);

        let kind = decide_sync_kind(now_millis(), db.last_major_sync_ms(), db.major_sync_period());
        let report = db.sync(kind)?;

        Ok(SyncOutcome {
            report,
            usable_space,
            switched_read_only,
        })
    }

    fn check_disk_space(&self, db: &Database, usable: Option<u64>) -> bool {
        let Some(usable) = usable else {
            return false;
        };
        if usable >= self.min_free_bytes {
            tracing::debug!(
                usable_mb = usable / BYTES_PER_MB,
                min_mb = self.min_free_bytes / BYTES_PER_MB,
                "usable disk space"
            );
            return false;
        }

        let reason = format!(
            "usable space {} MB on {} is below the minimum of {} MB",
            usable / BYTES_PER_MB,
            self.data_dir.display(),
            self.min_free_bytes / BYTES_PER_MB
        );
        if db.set_read_only(reason.clone()) {
            tracing::error!(
                fatal = true,
                usable_mb = usable / BYTES_PER_MB,
                min_mb = self.min_free_bytes / BYTES_PER_MB,
                data_dir = %self.data_dir.display(),
                "insufficient disk space, database switched to read-only"
            );
            true
        } else {
            tracing::warn!(%reason, "database remains read-only");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(180);

    #[test]
    fn overdue_major_sync_is_major() {
        let now = 10_000_000;
        let last = now - PERIOD.as_millis() as u64 - 1_000;
        assert_eq!(decide_sync_kind(now, last, PERIOD), SyncKind::Major);
    }

    #[test]
    fn fresh_major_sync_is_minor() {
        let now = 10_000_000;
        assert_eq!(decide_sync_kind(now, now, PERIOD), SyncKind::Minor);
    }

    #[test]
    fn exactly_one_period_is_still_minor() {
        let now = 10_000_000;
        let last = now - PERIOD.as_millis() as u64;
        assert_eq!(decide_sync_kind(now, last, PERIOD), SyncKind::Minor);
    }

    #[test]
    fn clock_going_backwards_is_minor() {
        assert_eq!(decide_sync_kind(5, 10, PERIOD), SyncKind::Minor);
    }
}
