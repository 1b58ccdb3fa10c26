//! Error types for the cache and its backing store.

use thiserror::Error;

/// Failure of the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store lock poisoned")]
  Poisoned,

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to prepare store location: {0}")]
  Io(#[from] std::io::Error),

  #[error("value could not be encoded for the store: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("store unavailable: {0}")]
  Unavailable(String),
}

/// Failure inside the cache.
///
/// Neither kind ever leaves [`CacheLayer`](super::CacheLayer): both are logged
/// and turned into a miss.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache storage unavailable: {0}")]
  StorageUnavailable(#[from] StoreError),

  #[error("cached value under {key} could not be decoded: {source}")]
  DeserializationFailure {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}
