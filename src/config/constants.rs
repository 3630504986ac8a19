//! # arbordb Configuration Constants
//!
//! This module centralizes all configuration constants, grouping interdependent
//! values together and documenting their relationships. Constants that depend
//! on each other are co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! JOURNAL_FILE_HEADER_SIZE (6 bytes: magic + version)
//!       │
//!       └─> first LSN offset of every segment = JOURNAL_FILE_HEADER_SIZE + 1
//!
//! JOURNAL_ENTRY_HEADER_SIZE (11 bytes: kind + txn id + payload size)
//!       │
//!       ├─> JOURNAL_ENTRY_OVERHEAD (header + back-link + checksum)
//!       │
//!       └─> MAX_JOURNAL_PAYLOAD (payload size is a u16, and the back-link
//!             stores payload + header as a u16, so the sum must fit)
//!
//! DEFAULT_SYNC_PERIOD (4s)
//!       │
//!       └─> DEFAULT_MAJOR_SYNC_PERIOD (must be >= sync period, otherwise every
//!             tick would be a major sync and minor syncs never happen)
//!
//! LOCK_SHARD_COUNT (64)
//!       └─> shards of the path -> lock map, per lock type
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions below:
//!
//! 1. `MAX_JOURNAL_PAYLOAD + JOURNAL_ENTRY_HEADER_SIZE <= u16::MAX` (back-link fits)
//! 2. `DEFAULT_SYNC_PERIOD_MS <= DEFAULT_MAJOR_SYNC_PERIOD_MS`
//! 3. `MIN_COLLECTION_CACHE_SIZE <= DEFAULT_COLLECTION_CACHE_SIZE`
//!
//! ## Usage
//!
//! ```ignore
//! use crate::config::{JOURNAL_ENTRY_OVERHEAD, LOCK_SHARD_COUNT};
//! ```

// ============================================================================
// JOURNAL LAYOUT
// These define the on-disk structure of journal segment files
// ============================================================================

/// Magic bytes at the start of every journal segment file.
pub const JOURNAL_MAGIC: [u8; 4] = [0x0E, 0x0D, 0x0B, 0x01];

/// Journal format version stored after the magic bytes.
pub const JOURNAL_VERSION: u16 = 1;

/// Size of the segment file header: magic (4) + version (2).
pub const JOURNAL_FILE_HEADER_SIZE: usize = 6;

/// Size of an entry header: kind (1) + txn id (8) + payload size (2).
pub const JOURNAL_ENTRY_HEADER_SIZE: usize = 11;

/// Size of the back-link trailer pointing at the start of the entry.
pub const JOURNAL_BACK_LINK_SIZE: usize = 2;

/// Size of the CRC-64 trailer.
pub const JOURNAL_CHECKSUM_SIZE: usize = 8;

/// Bytes an entry occupies in addition to its payload.
pub const JOURNAL_ENTRY_OVERHEAD: usize =
    JOURNAL_ENTRY_HEADER_SIZE + JOURNAL_BACK_LINK_SIZE + JOURNAL_CHECKSUM_SIZE;

/// Largest payload a single journal entry can carry.
pub const MAX_JOURNAL_PAYLOAD: usize = u16::MAX as usize - JOURNAL_ENTRY_HEADER_SIZE;

/// File extension of journal segments (`0000000001.log`).
pub const JOURNAL_FILE_EXTENSION: &str = "log";

/// Segment numbers are stored in the LSN as an `i16`; 0 is never used.
pub const MAX_JOURNAL_SEGMENT: i16 = i16::MAX;

/// Size at which `Journal::needs_checkpoint` starts reporting true.
pub const DEFAULT_JOURNAL_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Initial capacity of the in-memory append buffer.
pub const JOURNAL_BUFFER_SIZE: usize = 64 * 1024;

const _: () = assert!(
    MAX_JOURNAL_PAYLOAD + JOURNAL_ENTRY_HEADER_SIZE <= u16::MAX as usize,
    "journal back-link must fit in a u16"
);

const _: () = assert!(
    JOURNAL_FILE_HEADER_SIZE == JOURNAL_MAGIC.len() + 2,
    "JOURNAL_FILE_HEADER_SIZE derivation mismatch"
);

// ============================================================================
// DATA DIRECTORY
// ============================================================================

/// Lock file in the data directory held exclusively by the open database.
pub const DATA_DIR_LOCK_FILE: &str = "arbordb.lck";

// ============================================================================
// LOCK MANAGER
// ============================================================================

/// Number of shards for the path -> lock map (per lock type).
pub const LOCK_SHARD_COUNT: usize = 64;

// ============================================================================
// COLLECTION CACHE
// ============================================================================

/// Default number of collection slots.
pub const DEFAULT_COLLECTION_CACHE_SIZE: usize = 64;

/// Smallest accepted collection cache.
pub const MIN_COLLECTION_CACHE_SIZE: usize = 2;

const _: () = assert!(
    MIN_COLLECTION_CACHE_SIZE <= DEFAULT_COLLECTION_CACHE_SIZE,
    "default collection cache must satisfy the minimum"
);

// ============================================================================
// SYNC / CHECKPOINT
// ============================================================================

/// Default minimum free disk space in megabytes before switching to read-only.
pub const DEFAULT_DISK_SPACE_MIN_MB: u64 = 64;

/// Interval between sync coordinator ticks.
pub const DEFAULT_SYNC_PERIOD_MS: u64 = 4_000;

/// Interval after which a tick escalates to a major sync (checkpoint).
pub const DEFAULT_MAJOR_SYNC_PERIOD_MS: u64 = 180_000;

const _: () = assert!(
    DEFAULT_SYNC_PERIOD_MS <= DEFAULT_MAJOR_SYNC_PERIOD_MS,
    "major sync period must not be shorter than the sync period"
);

/// Bytes per megabyte for the `disk-space-min` option.
pub const BYTES_PER_MB: u64 = 1024 * 1024;
