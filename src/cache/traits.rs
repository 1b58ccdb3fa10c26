//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Payloads that can be stored in the cache.
///
/// Blanket-implemented for anything that round-trips through JSON.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned {}

/// Identifies one cache entry within a cache namespace.
pub trait CacheKey {
  /// Stable key used in storage (e.g. "items", "item:<hash>").
  fn cache_key(&self) -> String;

  /// Human-readable description for logs.
  fn description(&self) -> String {
    self.cache_key()
  }
}

impl CacheKey for str {
  fn cache_key(&self) -> String {
    self.to_string()
  }
}

impl CacheKey for String {
  fn cache_key(&self) -> String {
    self.clone()
  }
}

/// One cached record: the payload and when it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  pub cached_at: DateTime<Utc>,
}

/// Result from a cache-first fetch, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a cache hit.
  pub fn from_cache(entry: CacheEntry<T>) -> Self {
    Self {
      data: entry.data,
      source: CacheSource::Cache,
      cached_at: Some(entry.cached_at),
    }
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the content service
  Network,
  /// Served from a fresh cache entry
  Cache,
}
