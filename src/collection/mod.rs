//! # Collections
//!
//! - `entry`: the cached `Collection` object
//! - `cache`: `CollectionCache`, bounded with reference-density eviction
//! - `store`: `CollectionStore`, the mutex-guarded owner of the cache

mod cache;
mod entry;
mod store;

pub use cache::{CacheStatistics, CollectionCache, ConfigurationCache, NoConfigurationCache};
pub use entry::Collection;
pub use store::CollectionStore;
