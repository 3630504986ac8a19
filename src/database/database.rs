use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use eyre::{Result as EyreResult, WrapErr};
use parking_lot::{Mutex, RwLock};

use super::recovery::{self, RecoveryInfo};
use super::{DatabaseBuilder, DatabaseMode};
use crate::collection::{Collection, CollectionStore, ConfigurationCache, NoConfigurationCache};
use crate::config::{DatabaseConfig, DATA_DIR_LOCK_FILE};
use crate::error::{Error, Result};
use crate::lock::{LockManager, ResourcePath};
use crate::storage::{
    CheckpointInfo, DiskSpaceProbe, FileLock, Journal, JournalRecord, Lsn, RecordKind,
};
use crate::sync::{SyncCoordinator, SyncKind, SyncScheduler};

/// What one `Database::sync` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: SyncKind,
    pub collections_synced: usize,
    /// Set for major syncs.
    pub checkpoint: Option<CheckpointInfo>,
}

pub struct Database {
    config: DatabaseConfig,
    locks: Arc<LockManager>,
    collections: CollectionStore,
    journal: Journal,
    mode: RwLock<DatabaseMode>,
    last_major_sync: AtomicU64,
    next_txn: AtomicU64,
    recovery: RecoveryInfo,
    closed: AtomicBool,
    dir_lock: Mutex<Option<FileLock>>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Opens the database described by `config`, running journal recovery.
    /// Fails if another open database holds the data directory.
    pub fn open(config: DatabaseConfig) -> EyreResult<Self> {
        Self::open_with(config, Arc::new(NoConfigurationCache), |_, _| {})
    }

    /// Like `open`, with an external configuration cache that evictions
    /// invalidate and a redo visitor that receives every replayed record.
    pub fn open_with<F>(
        config: DatabaseConfig,
        configuration: Arc<dyn ConfigurationCache>,
        redo: F,
    ) -> EyreResult<Self>
    where
        F: FnMut(Lsn, &JournalRecord),
    {
        config.validate().wrap_err("invalid database configuration")?;

        fs::create_dir_all(&config.data_dir).wrap_err_with(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;

        let lock_path = config.data_dir.join(DATA_DIR_LOCK_FILE);
        let dir_lock = FileLock::lock(&lock_path).wrap_err_with(|| {
            format!(
                "data directory {} is in use: failed to lock {}",
                config.data_dir.display(),
                lock_path.display()
            )
        })?;

        let journal_dir = config.journal_dir();
        let journal = Journal::open(&journal_dir, config.journal_config())
            .wrap_err_with(|| format!("failed to open journal in {}", journal_dir.display()))?;

        let recovery = recovery::recover(&journal, redo).wrap_err("journal recovery failed")?;

        let locks = Arc::new(LockManager::new());
        let collections = CollectionStore::new(
            config.collection_cache_size,
            Arc::clone(&locks),
            configuration,
        );

        tracing::info!(
            data_dir = %config.data_dir.display(),
            clean = recovery.clean_shutdown,
            replayed = recovery.replayed,
            cache_size = config.collection_cache_size,
            "database opened"
        );

        Ok(Self {
            next_txn: AtomicU64::new(recovery.max_txn_id.saturating_add(1).max(1)),
            last_major_sync: AtomicU64::new(now_millis()),
            mode: RwLock::new(DatabaseMode::ReadWrite),
            closed: AtomicBool::new(false),
            dir_lock: Mutex::new(Some(dir_lock)),
            config,
            locks,
            collections,
            journal,
            recovery,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn collections(&self) -> &CollectionStore {
        &self.collections
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn recovery_info(&self) -> &RecoveryInfo {
        &self.recovery
    }

    pub fn mode(&self) -> DatabaseMode {
        self.mode.read().clone()
    }

    pub fn is_read_only(&self) -> bool {
        self.mode.read().is_read_only()
    }

    /// Fails with `Error::ReadOnly` unless writes are allowed.
    pub fn check_writable(&self) -> Result<()> {
        writable(&self.mode.read())
    }

    /// Switches to read-only. Returns `true` only for the call that made the
    /// transition; the first reason sticks. Journal writes already in flight
    /// finish before this returns and none start afterwards.
    pub fn set_read_only(&self, reason: impl Into<String>) -> bool {
        let mut mode = self.mode.write();
        if mode.is_read_only() {
            return false;
        }
        *mode = DatabaseMode::ReadOnly {
            reason: reason.into(),
        };
        true
    }

    pub fn next_txn_id(&self) -> u64 {
        self.next_txn.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the collection at `path`, loading it into the cache if needed.
    pub fn collection(&self, path: &str) -> Result<Arc<Collection>> {
        let path = ResourcePath::parse(path)?;
        self.collections.get_or_create(&path)
    }

    /// Write-path entry point: journals `record` unless the database is
    /// read-only. Commit and abort records go through the group-commit path.
    pub fn journal_mutation(&self, record: &JournalRecord) -> Result<Lsn> {
        // Held across the append so a concurrent `set_read_only` waits for it.
        let mode = self.mode.read();
        writable(&mode)?;
        let lsn = match record.kind {
            RecordKind::TxnCommit | RecordKind::TxnAbort => self.journal.append_group(record)?,
            _ => self.journal.append(record)?,
        };
        drop(mode);
        Ok(lsn)
    }

    pub fn begin(&self) -> Result<u64> {
        let txn_id = self.next_txn_id();
        self.journal_mutation(&JournalRecord::new(RecordKind::TxnStart, txn_id, Vec::new()))?;
        Ok(txn_id)
    }

    pub fn commit(&self, txn_id: u64) -> Result<Lsn> {
        self.journal_mutation(&JournalRecord::new(RecordKind::TxnCommit, txn_id, Vec::new()))
    }

    pub fn abort(&self, txn_id: u64) -> Result<Lsn> {
        self.journal_mutation(&JournalRecord::new(RecordKind::TxnAbort, txn_id, Vec::new()))
    }

    /// Flushes collections and the journal. A major sync also checkpoints.
    /// The checkpoint switches to a new segment only once the current one has
    /// reached `journal_max_segment_size`, and never in read-only mode.
    pub fn sync(&self, kind: SyncKind) -> Result<SyncReport> {
        let collections_synced = self.collections.sync_dirty();

        let checkpoint = match kind {
            SyncKind::Minor => {
                self.journal.flush_all(true)?;
                tracing::debug!(collections = collections_synced, "minor sync");
                None
            }
            SyncKind::Major => {
                let switch_files = !self.is_read_only() && self.journal.needs_checkpoint();
                let info = self.journal.checkpoint(self.next_txn_id(), switch_files)?;
                self.last_major_sync.store(now_millis(), Ordering::Release);
                tracing::info!(
                    collections = collections_synced,
                    checkpoint = %info.lsn,
                    switched = info.switched_files,
                    "major sync"
                );
                Some(info)
            }
        };

        Ok(SyncReport {
            kind,
            collections_synced,
            checkpoint,
        })
    }

    pub fn last_major_sync_ms(&self) -> u64 {
        self.last_major_sync.load(Ordering::Acquire)
    }

    /// Overrides the recorded time of the last major sync.
    pub fn set_last_major_sync_ms(&self, millis: u64) {
        self.last_major_sync.store(millis, Ordering::Release);
    }

    pub fn major_sync_period(&self) -> Duration {
        self.config.major_sync_period
    }

    /// Starts the periodic sync task for this database.
    pub fn start_sync(
        self: &Arc<Self>,
        probe: Arc<dyn DiskSpaceProbe>,
    ) -> EyreResult<SyncScheduler> {
        let coordinator = SyncCoordinator::configure(&self.config, probe)?;
        SyncScheduler::start(Arc::clone(self), coordinator, self.config.sync_period)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wakes blocked lock waiters, flushes collections, shuts the journal
    /// down and releases the data directory. A read-only database skips the
    /// final checkpoint, so the next open runs recovery. Calling `close` twice
    /// is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.locks.interrupt_waiters();
        let synced = self.collections.sync_dirty();
        let checkpoint = !self.is_read_only();
        let shutdown = self.journal.shutdown(self.next_txn_id(), checkpoint);
        self.dir_lock.lock().take();
        shutdown?;

        tracing::info!(
            data_dir = %self.config.data_dir.display(),
            collections = synced,
            checkpoint,
            "database closed"
        );
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close database cleanly");
        }
    }
}

fn writable(mode: &DatabaseMode) -> Result<()> {
    match mode {
        DatabaseMode::ReadWrite => Ok(()),
        DatabaseMode::ReadOnly { reason } => Err(Error::ReadOnly {
            reason: reason.clone(),
        }),
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
