//! Versioned, time-bounded cache for remotely fetched content.
//!
//! This module provides a content-agnostic caching mechanism that:
//! - Stores entries in a durable key-value store under a reserved key prefix
//! - Namespaces every entry by a version tag, so bumping the tag orphans old entries
//! - Treats entries older than the freshness window as absent
//! - Degrades every storage or decoding failure to a cache miss

mod clock;
mod error;
mod layer;
mod storage;
mod traits;

pub use clock::{Clock, SystemClock};
pub use error::{CacheError, StoreError};
pub use layer::{is_valid_segment, CacheLayer, CacheStatus};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use traits::{CacheEntry, CacheKey, CacheResult, CacheSource, Cacheable};

#[cfg(test)]
pub use clock::ManualClock;
