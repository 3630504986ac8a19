//! # Database Builder
//!
//! `DatabaseBuilder` is the fluent way to assemble a `DatabaseConfig` and open
//! a database. Settings can be chained in any order before calling `open()`.
//!
//! ## Configuration Options
//!
//! | Option                   | Default              | Description                          |
//! |--------------------------|----------------------|--------------------------------------|
//! | path                     | required             | Data directory, created if missing   |
//! | journal_dir              | `<path>/journal`     | Where journal segments live          |
//! | disk_space_min_mb        | 64                   | Read-only threshold for free space   |
//! | sync_period              | 4 s                  | Interval of the sync task            |
//! | major_sync_period        | 3 min                | Minimum time between checkpoints     |
//! | collection_cache_size    | 64                   | Collection cache slots (min 2)       |
//! | journal_group_commit     | false                | Leave commit syncing to the caller   |
//! | journal_max_segment_size | 64 MiB               | Size that requests a checkpoint      |
//!
//! ## Usage Examples
//!
//! ```ignore
//! let db = Database::builder()
//!     .path("./data")
//!     .disk_space_min_mb(256)
//!     .collection_cache_size(128)
//!     .open()?;
//! ```
//!
//! With a redo visitor for recovery:
//!
//! ```ignore
//! let db = Database::builder()
//!     .path("./data")
//!     .open_with_redo(|lsn, record| apply(lsn, record))?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;

use crate::collection::{ConfigurationCache, NoConfigurationCache};
use crate::config::DatabaseConfig;
use crate::storage::{JournalRecord, Lsn};

/// Builder for configuring and opening a database.
///
/// Use `Database::builder()` to create a new builder.
pub struct DatabaseBuilder {
    data_dir: Option<PathBuf>,
    journal_dir: Option<PathBuf>,
    disk_space_min_mb: Option<u64>,
    sync_period: Option<Duration>,
    major_sync_period: Option<Duration>,
    collection_cache_size: Option<usize>,
    journal_group_commit: Option<bool>,
    journal_max_segment_size: Option<u64>,
    configuration: Option<Arc<dyn ConfigurationCache>>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            journal_dir: None,
            disk_space_min_mb: None,
            sync_period: None,
            major_sync_period: None,
            collection_cache_size: None,
            journal_group_commit: None,
            journal_max_segment_size: None,
            configuration: None,
        }
    }

    /// Sets the data directory. Required.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn journal_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.journal_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Free space, in MB, below which the sync task switches the database to
    /// read-only.
    pub fn disk_space_min_mb(mut self, mb: u64) -> Self {
        self.disk_space_min_mb = Some(mb);
        self
    }

    pub fn sync_period(mut self, period: Duration) -> Self {
        self.sync_period = Some(period);
        self
    }

    pub fn major_sync_period(mut self, period: Duration) -> Self {
        self.major_sync_period = Some(period);
        self
    }

    pub fn collection_cache_size(mut self, slots: usize) -> Self {
        self.collection_cache_size = Some(slots);
        self
    }

    pub fn journal_group_commit(mut self, enabled: bool) -> Self {
        self.journal_group_commit = Some(enabled);
        self
    }

    pub fn journal_max_segment_size(mut self, bytes: u64) -> Self {
        self.journal_max_segment_size = Some(bytes);
        self
    }

    /// External cache invalidated whenever a collection is evicted.
    pub fn configuration_cache(mut self, cache: Arc<dyn ConfigurationCache>) -> Self {
        self.configuration = Some(cache);
        self
    }

    /// Assembles the configuration without opening anything.
    pub fn config(&self) -> Result<DatabaseConfig> {
        let data_dir = self
            .data_dir
            .as_ref()
            .ok_or_else(|| eyre::eyre!("data directory not specified: call .path() first"))?;

        let mut config = DatabaseConfig::new(data_dir);
        config.journal_dir = self.journal_dir.clone();
        if let Some(mb) = self.disk_space_min_mb {
            config.disk_space_min_mb = mb;
        }
        if let Some(period) = self.sync_period {
            config.sync_period = period;
        }
        if let Some(period) = self.major_sync_period {
            config.major_sync_period = period;
        }
        if let Some(slots) = self.collection_cache_size {
            config.collection_cache_size = slots;
        }
        if let Some(enabled) = self.journal_group_commit {
            config.journal_group_commit = enabled;
        }
        if let Some(bytes) = self.journal_max_segment_size {
            config.journal_max_segment_size = bytes;
        }
        config.validate()?;
        Ok(config)
    }

    /// Opens or creates the database.
    ///
    /// # Errors
    ///
    /// Returns an error if no path was given, a setting is out of range, the
    /// data directory cannot be created or journal recovery fails.
    pub fn open(self) -> Result<super::Database> {
        self.open_with_redo(|_, _| {})
    }

    /// Opens the database, handing every record replayed during recovery to
    /// `redo`.
    pub fn open_with_redo<F>(self, redo: F) -> Result<super::Database>
    where
        F: FnMut(Lsn, &JournalRecord),
    {
        let config = self.config()?;
        let configuration = self
            .configuration
            .unwrap_or_else(|| Arc::new(NoConfigurationCache));
        super::Database::open_with(config, configuration, redo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_without_path_fails() {
        let err = DatabaseBuilder::new().open().err().expect("should fail");
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn settings_reach_the_config() {
        let config = DatabaseBuilder::new()
            .path("/tmp/arbordb")
            .disk_space_min_mb(10)
            .collection_cache_size(5)
            .major_sync_period(Duration::from_secs(1))
            .journal_group_commit(true)
            .config()
            .expect("should build");

        assert_eq!(config.disk_space_min_mb, 10);
        assert_eq!(config.collection_cache_size, 5);
        assert_eq!(config.major_sync_period, Duration::from_secs(1));
        assert!(config.journal_group_commit);
        assert_eq!(config.journal_dir(), PathBuf::from("/tmp/arbordb/journal"));
    }

    #[test]
    fn invalid_cache_size_is_rejected() {
        let result = DatabaseBuilder::new()
            .path("/tmp/arbordb")
            .collection_cache_size(1)
            .config();
        assert!(result.is_err());
    }

    #[test]
    fn open_creates_the_data_directory() {
        let dir = tempdir().expect("should create temp dir");
        let path = dir.path().join("nested").join("db");

        let db = DatabaseBuilder::new().path(&path).open().expect("should open");
        assert!(path.join("journal").is_dir());
        assert!(path.join(crate::config::DATA_DIR_LOCK_FILE).is_file());
        assert!(!db.is_read_only());
    }
}
