//! # Runtime Database Configuration
//!
//! `DatabaseConfig` carries every tunable of an open database. It is built
//! either in code (usually through `DatabaseBuilder`) or from string
//! properties, as read from a configuration file:
//!
//! | Key                        | Unit    | Default             |
//! |----------------------------|---------|---------------------|
//! | `data-dir`                 | path    | required            |
//! | `journal-dir`              | path    | `<data-dir>/journal`|
//! | `disk-space-min`           | MB      | 64                  |
//! | `sync-period`              | ms      | 4000                |
//! | `major-sync-period`        | ms      | 180000              |
//! | `collection-cache-size`    | slots   | 64                  |
//! | `journal-group-commit`     | bool    | false               |
//! | `journal-max-segment-size` | bytes   | 64 MiB              |
//!
//! Unknown keys are ignored so one file can configure several components.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{ensure, eyre, Result, WrapErr};

use super::constants::{
    BYTES_PER_MB, DEFAULT_COLLECTION_CACHE_SIZE, DEFAULT_DISK_SPACE_MIN_MB,
    DEFAULT_JOURNAL_MAX_SEGMENT_SIZE, DEFAULT_MAJOR_SYNC_PERIOD_MS, DEFAULT_SYNC_PERIOD_MS,
    MIN_COLLECTION_CACHE_SIZE,
};
use crate::storage::JournalConfig;

pub const KEY_DATA_DIR: &str = "data-dir";
pub const KEY_JOURNAL_DIR: &str = "journal-dir";
pub const KEY_DISK_SPACE_MIN: &str = "disk-space-min";
pub const KEY_SYNC_PERIOD: &str = "sync-period";
pub const KEY_MAJOR_SYNC_PERIOD: &str = "major-sync-period";
pub const KEY_COLLECTION_CACHE_SIZE: &str = "collection-cache-size";
pub const KEY_JOURNAL_GROUP_COMMIT: &str = "journal-group-commit";
pub const KEY_JOURNAL_MAX_SEGMENT_SIZE: &str = "journal-max-segment-size";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    pub journal_dir: Option<PathBuf>,
    pub disk_space_min_mb: u64,
    pub sync_period: Duration,
    pub major_sync_period: Duration,
    pub collection_cache_size: usize,
    pub journal_group_commit: bool,
    pub journal_max_segment_size: u64,
}

impl DatabaseConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            journal_dir: None,
            disk_space_min_mb: DEFAULT_DISK_SPACE_MIN_MB,
            sync_period: Duration::from_millis(DEFAULT_SYNC_PERIOD_MS),
            major_sync_period: Duration::from_millis(DEFAULT_MAJOR_SYNC_PERIOD_MS),
            collection_cache_size: DEFAULT_COLLECTION_CACHE_SIZE,
            journal_group_commit: false,
            journal_max_segment_size: DEFAULT_JOURNAL_MAX_SEGMENT_SIZE,
        }
    }

    /// Parses string properties. `data-dir` is required.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut data_dir = None;
        let mut pending = Vec::new();

        for (key, value) in properties {
            let (key, value) = (key.as_ref().trim(), value.as_ref().trim());
            if key == KEY_DATA_DIR {
                ensure!(!value.is_empty(), "{} must not be empty", KEY_DATA_DIR);
                data_dir = Some(PathBuf::from(value));
            } else {
                pending.push((key.to_string(), value.to_string()));
            }
        }

        let data_dir = data_dir.ok_or_else(|| eyre!("missing required property {}", KEY_DATA_DIR))?;
        let mut config = Self::new(data_dir);

        for (key, value) in pending {
            config
                .apply(&key, &value)
                .wrap_err_with(|| format!("invalid value {:?} for {}", value, key))?;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_JOURNAL_DIR => {
                ensure!(!value.is_empty(), "path must not be empty");
                self.journal_dir = Some(PathBuf::from(value));
            }
            KEY_DISK_SPACE_MIN => self.disk_space_min_mb = value.parse()?,
            KEY_SYNC_PERIOD => self.sync_period = Duration::from_millis(value.parse()?),
            KEY_MAJOR_SYNC_PERIOD => {
                self.major_sync_period = Duration::from_millis(value.parse()?)
            }
            KEY_COLLECTION_CACHE_SIZE => self.collection_cache_size = value.parse()?,
            KEY_JOURNAL_GROUP_COMMIT => self.journal_group_commit = parse_bool(value)?,
            KEY_JOURNAL_MAX_SEGMENT_SIZE => self.journal_max_segment_size = value.parse()?,
            other => tracing::debug!(key = other, "ignoring unknown configuration property"),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.sync_period.is_zero(), "{} must be positive", KEY_SYNC_PERIOD);
        ensure!(
            !self.major_sync_period.is_zero(),
            "{} must be positive",
            KEY_MAJOR_SYNC_PERIOD
        );
        ensure!(
            self.collection_cache_size >= MIN_COLLECTION_CACHE_SIZE,
            "{} must be at least {}, got {}",
            KEY_COLLECTION_CACHE_SIZE,
            MIN_COLLECTION_CACHE_SIZE,
            self.collection_cache_size
        );
        ensure!(
            self.journal_max_segment_size > 0,
            "{} must be positive",
            KEY_JOURNAL_MAX_SEGMENT_SIZE
        );
        Ok(())
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.journal_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("journal"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn disk_space_min_bytes(&self) -> u64 {
        self.disk_space_min_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn journal_config(&self) -> JournalConfig {
        JournalConfig {
            group_commit: self.journal_group_commit,
            max_segment_size: self.journal_max_segment_size,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(eyre!("expected a boolean (yes/no, true/false, on/off, 1/0)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_constants() {
        let config = DatabaseConfig::new("/var/lib/arbordb");
        assert_eq!(config.disk_space_min_mb, DEFAULT_DISK_SPACE_MIN_MB);
        assert_eq!(config.journal_dir(), PathBuf::from("/var/lib/arbordb/journal"));
        assert_eq!(config.disk_space_min_bytes(), DEFAULT_DISK_SPACE_MIN_MB * 1024 * 1024);
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn properties_override_defaults() {
        let config = DatabaseConfig::from_properties([
            ("data-dir", "/data"),
            ("disk-space-min", "128"),
            ("major-sync-period", "60000"),
            ("sync-period", "1000"),
            ("collection-cache-size", "8"),
            ("journal-group-commit", "yes"),
            ("journal-dir", "/fast/journal"),
            ("unrelated-key", "whatever"),
        ])
        .expect("should parse");

        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.disk_space_min_bytes(), 128 * 1024 * 1024);
        assert_eq!(config.major_sync_period, Duration::from_secs(60));
        assert_eq!(config.sync_period, Duration::from_secs(1));
        assert_eq!(config.collection_cache_size, 8);
        assert!(config.journal_group_commit);
        assert_eq!(config.journal_dir(), PathBuf::from("/fast/journal"));
    }

    #[test]
    fn missing_data_dir_fails() {
        let err = DatabaseConfig::from_properties([("disk-space-min", "1")]).unwrap_err();
        assert!(err.to_string().contains("data-dir"));
    }

    #[test]
    fn bad_number_names_the_key() {
        let err = DatabaseConfig::from_properties([("data-dir", "/d"), ("disk-space-min", "lots")])
            .unwrap_err();
        assert!(err.to_string().contains("disk-space-min"));
    }

    #[test]
    fn tiny_cache_is_rejected() {
        let err =
            DatabaseConfig::from_properties([("data-dir", "/d"), ("collection-cache-size", "1")])
                .unwrap_err();
        assert!(err.to_string().contains("collection-cache-size"));
    }
}
