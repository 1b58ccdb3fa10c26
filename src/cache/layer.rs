//! Cache layer that owns one versioned namespace in a key-value store.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::error::{CacheError, StoreError};
use super::storage::KeyValueStore;
use super::traits::{CacheEntry, CacheKey, CacheResult, Cacheable};

const DEFAULT_VERSION: &str = "v1";

/// Whether `segment` can be used as a prefix, kind or version tag.
///
/// Segments are joined with ':' so they must not contain one.
pub fn is_valid_segment(segment: &str) -> bool {
  !segment.is_empty() && !segment.contains(':')
}

/// Cache layer for one kind of content.
///
/// Storage keys have the shape `<namespace>:<version>:<key>`, where the
/// namespace is the reserved prefix plus the content kind. Several layers
/// may share one store as long as their namespaces differ. Clones share the
/// store and the active version tag.
pub struct CacheLayer<S: KeyValueStore + ?Sized> {
  store: Arc<S>,
  namespace: Arc<str>,
  version: Arc<RwLock<String>>,
  /// Entries at least this old are treated as absent
  freshness: Duration,
  /// Whether `initialize` clears the namespace
  clear_on_load: bool,
  /// When false, reads miss and writes are skipped. Invalidation still
  /// reaches the store.
  enabled: bool,
  clock: Arc<dyn Clock>,
}

/// Snapshot of a cache namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
  pub namespace: String,
  pub version: String,
  pub freshness: Duration,
  /// Entries stored under the active version tag (fresh or not)
  pub current_entries: usize,
  /// Entries left behind by earlier version tags
  pub orphaned_entries: usize,
}

impl<S: KeyValueStore + ?Sized> CacheLayer<S> {
  /// Create a cache layer owning `<prefix>:<kind>` in the given store.
  pub fn new(store: Arc<S>, prefix: &str, kind: &str) -> Self {
    Self {
      store,
      namespace: Arc::from(format!("{}:{}", prefix, kind)),
      version: Arc::new(RwLock::new(DEFAULT_VERSION.to_string())),
      freshness: Duration::minutes(5),
      clear_on_load: false,
      enabled: true,
      clock: Arc::new(SystemClock),
    }
  }

  /// Set the freshness window.
  pub fn with_freshness(mut self, freshness: Duration) -> Self {
    self.freshness = freshness;
    self
  }

  /// Set the initial version tag. Invalid tags are ignored.
  pub fn with_version(self, version: impl Into<String>) -> Self {
    let version = version.into();
    if !is_valid_segment(&version) {
      warn!(namespace = %self.namespace, tag = %version, "ignoring invalid cache version tag");
      return self;
    }
    Self {
      version: Arc::new(RwLock::new(version)),
      ..self
    }
  }

  /// Clear the namespace when `initialize` runs.
  pub fn with_clear_on_load(mut self, clear_on_load: bool) -> Self {
    self.clear_on_load = clear_on_load;
    self
  }

  /// Turn reads and writes off without losing the ability to clear.
  pub fn with_enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  /// Use a different time source.
  #[cfg(test)]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn freshness(&self) -> Duration {
    self.freshness
  }

  /// The active version tag.
  pub fn version(&self) -> String {
    self
      .version
      .read()
      .map(|v| v.clone())
      .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
  }

  /// Startup hook. Clears the namespace if configured to.
  pub fn initialize(&self) {
    if self.clear_on_load {
      debug!(namespace = %self.namespace, "clearing cache on load");
      self.invalidate_all();
    }
  }

  /// Look up `key` under the active version tag.
  ///
  /// Missing, expired and unreadable entries all come back as `None`.
  /// Expired and undecodable entries are removed on the way out.
  pub fn get<T, K>(&self, key: &K) -> Option<CacheEntry<T>>
  where
    T: Cacheable,
    K: CacheKey + ?Sized,
  {
    if !self.enabled {
      return None;
    }
    match self.try_get(key) {
      Ok(entry) => entry,
      Err(err) => {
        debug!(key = %key.description(), error = %err, "cache read failed, treating as miss");
        None
      }
    }
  }

  /// Write `value` under `key` with a capture timestamp of now.
  ///
  /// A failed write is logged and the key is dropped, so the superseded
  /// value is never served afterwards.
  pub fn put<T, K>(&self, key: &K, value: &T)
  where
    T: Serialize + ?Sized,
    K: CacheKey + ?Sized,
  {
    if !self.enabled {
      return;
    }
    let storage_key = self.storage_key(key);
    if let Err(err) = self.try_put(&storage_key, value) {
      warn!(key = %key.description(), error = %err, "cache write failed");
      if let Err(err) = self.store.remove(&storage_key) {
        debug!(key = %storage_key, error = %err, "failed to drop entry after write failure");
      }
    }
  }

  /// Remove every entry in this namespace, whatever its key or version tag.
  pub fn invalidate_all(&self) {
    match self.store.remove_prefix(&self.namespace_prefix()) {
      Ok(removed) => info!(namespace = %self.namespace, removed, "cache invalidated"),
      Err(err) => warn!(namespace = %self.namespace, error = %err, "cache invalidation failed"),
    }
  }

  /// Switch to a new version tag. Entries under the old tag become
  /// unreachable and are left in place.
  ///
  /// Empty tags and tags containing ':' are logged and ignored.
  pub fn bump_version(&self, tag: impl Into<String>) {
    let tag = tag.into();
    if !is_valid_segment(&tag) {
      warn!(namespace = %self.namespace, tag = %tag, "ignoring invalid cache version tag");
      return;
    }
    let mut version = self
      .version
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if *version == tag {
      return;
    }
    info!(namespace = %self.namespace, from = %version.as_str(), to = %tag, "cache version bumped");
    *version = tag;
  }

  /// Count entries under the active tag and under earlier tags.
  pub fn status(&self) -> Result<CacheStatus, CacheError> {
    let version = self.version();
    let all = self.store.keys_with_prefix(&self.namespace_prefix())?;
    let current_prefix = format!("{}:{}:", self.namespace, version);
    let current_entries = all.iter().filter(|k| k.starts_with(&current_prefix)).count();

    Ok(CacheStatus {
      namespace: self.namespace.to_string(),
      version,
      freshness: self.freshness,
      current_entries,
      orphaned_entries: all.len() - current_entries,
    })
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh entry under the active tag - return it, skip the fetcher
  /// 2. Otherwise run the fetcher, store the result and return it
  ///
  /// Fetcher errors are returned as-is. Racing fetches for the same key
  /// are not coordinated; the last write wins.
  pub async fn fetch<T, K, F, Fut>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Cacheable,
    K: CacheKey + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(entry) = self.get(key) {
      trace!(key = %key.description(), "cache hit");
      return Ok(CacheResult::from_cache(entry));
    }

    trace!(key = %key.description(), "cache miss");
    let data = fetcher().await?;
    self.put(key, &data);
    Ok(CacheResult::from_network(data))
  }

  fn try_get<T, K>(&self, key: &K) -> Result<Option<CacheEntry<T>>, CacheError>
  where
    T: Cacheable,
    K: CacheKey + ?Sized,
  {
    let storage_key = self.storage_key(key);
    let Some(raw) = self.store.get(&storage_key)? else {
      return Ok(None);
    };

    let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(source) => {
        self.discard(&storage_key);
        return Err(CacheError::DeserializationFailure {
          key: storage_key,
          source,
        });
      }
    };

    if !self.is_fresh(entry.cached_at) {
      trace!(key = %storage_key, cached_at = %entry.cached_at, "cache entry expired");
      self.discard(&storage_key);
      return Ok(None);
    }

    Ok(Some(entry))
  }

  fn try_put<T: Serialize + ?Sized>(&self, storage_key: &str, value: &T) -> Result<(), CacheError> {
    let entry = CacheEntry {
      data: value,
      cached_at: self.clock.now(),
    };
    let raw = serde_json::to_string(&entry).map_err(StoreError::from)?;
    self.store.set(storage_key, &raw)?;
    Ok(())
  }

  fn discard(&self, storage_key: &str) {
    if let Err(err) = self.store.remove(storage_key) {
      debug!(key = %storage_key, error = %err, "failed to remove cache entry");
    }
  }

  /// An entry is fresh while its age is below the freshness window.
  fn is_fresh(&self, cached_at: DateTime<Utc>) -> bool {
    self.clock.now() - cached_at < self.freshness
  }

  fn namespace_prefix(&self) -> String {
    format!("{}:", self.namespace)
  }

  fn storage_key<K: CacheKey + ?Sized>(&self, key: &K) -> String {
    format!("{}:{}:{}", self.namespace, self.version(), key.cache_key())
  }
}

impl<S: KeyValueStore + ?Sized> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      namespace: Arc::clone(&self.namespace),
      version: Arc::clone(&self.version),
      freshness: self.freshness,
      clear_on_load: self.clear_on_load,
      enabled: self.enabled,
      clock: Arc::clone(&self.clock),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, ManualClock, MemoryStore};
  use chrono::TimeZone;
  use color_eyre::eyre::eyre;
  use serde::Deserialize;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Record {
    id: String,
  }

  fn records(ids: &[&str]) -> Vec<Record> {
    ids
      .iter()
      .map(|id| Record { id: id.to_string() })
      .collect()
  }

  fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
  }

  fn create_test_cache() -> (CacheLayer<MemoryStore>, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::at(epoch()));
    let cache = CacheLayer::new(Arc::clone(&store), "test-cache", "items")
      .with_freshness(Duration::seconds(300))
      .with_clock(clock.clone());
    (cache, store, clock)
  }

  /// Store whose writes can be switched to fail.
  #[derive(Default)]
  struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
  }

  impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
      if self.fail_reads.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable("storage disabled".into()));
      }
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
      if self.fail_writes.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable("quota exceeded".into()));
      }
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
      self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
      self.inner.keys_with_prefix(prefix)
    }
  }

  #[test]
  fn test_put_then_get_returns_value() {
    let (cache, _store, _clock) = create_test_cache();
    let value = records(&["a", "b"]);

    cache.put("items", &value);
    let entry: CacheEntry<Vec<Record>> = cache.get("items").expect("entry should be cached");

    assert_eq!(entry.data, value);
    assert_eq!(entry.cached_at, epoch());
  }

  #[test]
  fn test_get_missing_key_is_absent() {
    let (cache, _store, _clock) = create_test_cache();
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_put_replaces_previous_value() {
    let (cache, _store, clock) = create_test_cache();
    cache.put("items", &records(&["a"]));
    clock.advance(Duration::seconds(10));
    cache.put("items", &records(&["b"]));

    let entry: CacheEntry<Vec<Record>> = cache.get("items").unwrap();
    assert_eq!(entry.data, records(&["b"]));
    assert_eq!(entry.cached_at, epoch() + Duration::seconds(10));
  }

  #[test]
  fn test_expiry_boundary() {
    let (cache, _store, clock) = create_test_cache();
    cache.put("items", &records(&["a"]));

    clock.set(epoch() + Duration::seconds(300) - Duration::milliseconds(1));
    assert!(cache.get::<Vec<Record>, _>("items").is_some());

    clock.set(epoch() + Duration::seconds(300) + Duration::milliseconds(1));
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_expiry_and_refresh_scenario() {
    let (cache, _store, clock) = create_test_cache();
    cache.put("items", &records(&["a"]));

    clock.set(epoch() + Duration::seconds(100));
    let entry: CacheEntry<Vec<Record>> = cache.get("items").unwrap();
    assert_eq!(entry.data, records(&["a"]));

    clock.set(epoch() + Duration::seconds(400));
    assert!(cache.get::<Vec<Record>, _>("items").is_none());

    cache.put("items", &records(&["a", "b"]));
    clock.set(epoch() + Duration::seconds(401));
    let entry: CacheEntry<Vec<Record>> = cache.get("items").unwrap();
    assert_eq!(entry.data, records(&["a", "b"]));
  }

  #[test]
  fn test_expired_entry_is_removed_on_read() {
    let (cache, store, clock) = create_test_cache();
    cache.put("items", &records(&["a"]));
    assert_eq!(store.keys_with_prefix("test-cache:").unwrap().len(), 1);

    clock.advance(Duration::seconds(301));
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
    assert!(store.keys_with_prefix("test-cache:").unwrap().is_empty());
  }

  #[test]
  fn test_invalidate_all_removes_every_key_and_version() {
    let (cache, store, _clock) = create_test_cache();
    cache.put("items", &records(&["a"]));
    cache.put("item:a", &Record { id: "a".into() });
    cache.bump_version("v2");
    cache.put("items", &records(&["b"]));

    cache.invalidate_all();

    assert!(cache.get::<Vec<Record>, _>("items").is_none());
    assert!(cache.get::<Record, _>("item:a").is_none());
    assert!(store.keys_with_prefix("test-cache:items:").unwrap().is_empty());
  }

  #[test]
  fn test_invalidate_all_leaves_foreign_keys() {
    let (cache, store, _clock) = create_test_cache();
    store.set("session:token", "secret").unwrap();
    store.set("test-cache:timeline:v1:items", "{}").unwrap();
    cache.put("items", &records(&["a"]));

    cache.invalidate_all();

    assert_eq!(store.get("session:token").unwrap().as_deref(), Some("secret"));
    assert!(store.get("test-cache:timeline:v1:items").unwrap().is_some());
  }

  #[test]
  fn test_bump_version_misses_old_entries_without_purging() {
    let (cache, store, _clock) = create_test_cache();
    cache.put("items", &records(&["a"]));

    cache.bump_version("v2");

    assert_eq!(cache.version(), "v2");
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
    assert!(store.get("test-cache:items:v1:items").unwrap().is_some());

    let status = cache.status().unwrap();
    assert_eq!(status.current_entries, 0);
    assert_eq!(status.orphaned_entries, 1);
  }

  #[test]
  fn test_bump_version_is_shared_by_clones() {
    let (cache, _store, _clock) = create_test_cache();
    let clone = cache.clone();
    cache.put("items", &records(&["a"]));

    clone.bump_version("v2");

    assert_eq!(cache.version(), "v2");
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_bumping_back_to_old_tag_reaches_old_entries() {
    let (cache, _store, _clock) = create_test_cache();
    cache.put("items", &records(&["a"]));
    cache.bump_version("v2");
    cache.bump_version("v1");

    assert!(cache.get::<Vec<Record>, _>("items").is_some());
  }

  #[test]
  fn test_bump_version_ignores_tags_that_would_alias_keys() {
    let (cache, store, _clock) = create_test_cache();
    cache.put("category:x", &records(&["a"]));

    cache.bump_version("v1:items");
    cache.bump_version("");

    assert_eq!(cache.version(), "v1");
    cache.put("category:x", &records(&["b"]));
    assert_eq!(store.keys_with_prefix("test-cache:items:").unwrap().len(), 1);
    let status = cache.status().unwrap();
    assert_eq!(status.current_entries, 1);
    assert_eq!(status.orphaned_entries, 0);
  }

  #[test]
  fn test_with_version_ignores_invalid_tag() {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheLayer::new(store, "test-cache", "items").with_version("a:b");
    assert_eq!(cache.version(), "v1");
    assert!(!is_valid_segment(""));
    assert!(is_valid_segment("v2"));
  }

  #[test]
  fn test_undecodable_entry_is_a_miss_and_is_dropped() {
    let (cache, store, _clock) = create_test_cache();
    store.set("test-cache:items:v1:items", "{not json").unwrap();

    assert!(cache.get::<Vec<Record>, _>("items").is_none());
    assert!(store.get("test-cache:items:v1:items").unwrap().is_none());
  }

  #[test]
  fn test_entry_with_incompatible_shape_is_a_miss() {
    let (cache, _store, _clock) = create_test_cache();
    cache.put("items", &vec![1, 2, 3]);
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_write_failure_does_not_escape_put() {
    let store = Arc::new(FlakyStore::default());
    let cache = CacheLayer::new(Arc::clone(&store), "test-cache", "items");
    cache.put("items", &records(&["a"]));

    store.fail_writes.store(true, Ordering::SeqCst);
    cache.put("items", &records(&["a", "b"]));

    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_read_failure_is_a_miss() {
    let store = Arc::new(FlakyStore::default());
    let cache = CacheLayer::new(Arc::clone(&store), "test-cache", "items");
    cache.put("items", &records(&["a"]));

    store.fail_reads.store(true, Ordering::SeqCst);
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_initialize_respects_clear_on_load() {
    let store = Arc::new(MemoryStore::new());
    let keep = CacheLayer::new(Arc::clone(&store), "test-cache", "items");
    keep.put("items", &records(&["a"]));

    keep.initialize();
    assert!(keep.get::<Vec<Record>, _>("items").is_some());

    let clear = keep.clone().with_clear_on_load(true);
    clear.initialize();
    assert!(keep.get::<Vec<Record>, _>("items").is_none());
  }

  #[test]
  fn test_disabled_layer_bypasses_store_but_still_clears() {
    let (cache, store, _clock) = create_test_cache();
    cache.put("items", &records(&["a"]));

    let disabled = cache.clone().with_enabled(false);
    assert!(disabled.get::<Vec<Record>, _>("items").is_none());
    disabled.put("items", &records(&["b"]));
    let entry: CacheEntry<Vec<Record>> = cache.get("items").unwrap();
    assert_eq!(entry.data, records(&["a"]));

    disabled.invalidate_all();
    assert!(store.keys_with_prefix("test-cache:").unwrap().is_empty());
  }

  #[test]
  fn test_layers_with_different_kinds_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let items = CacheLayer::new(Arc::clone(&store), "test-cache", "items");
    let timeline = CacheLayer::new(Arc::clone(&store), "test-cache", "timeline");

    items.put("list", &records(&["a"]));
    timeline.put("list", &records(&["t"]));
    timeline.bump_version("v9");

    let entry: CacheEntry<Vec<Record>> = items.get("list").unwrap();
    assert_eq!(entry.data, records(&["a"]));
    assert!(timeline.get::<Vec<Record>, _>("list").is_none());

    items.invalidate_all();
    timeline.bump_version("v1");
    assert!(timeline.get::<Vec<Record>, _>("list").is_some());
  }

  #[tokio::test]
  async fn test_fetch_uses_cache_on_hit() {
    let (cache, _store, _clock) = create_test_cache();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let first = cache
      .fetch("items", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(records(&["a"]))
      })
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let counter = Arc::clone(&calls);
    let second = cache
      .fetch("items", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(records(&["changed"]))
      })
      .await
      .unwrap();

    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, records(&["a"]));
    assert_eq!(second.cached_at, Some(epoch()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_refetches_after_expiry() {
    let (cache, _store, clock) = create_test_cache();
    cache.put("items", &records(&["a"]));
    clock.advance(Duration::seconds(300));

    let result = cache
      .fetch("items", || async { Ok(records(&["a", "b"])) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    let entry: CacheEntry<Vec<Record>> = cache.get("items").unwrap();
    assert_eq!(entry.data, records(&["a", "b"]));
  }

  #[tokio::test]
  async fn test_fetch_error_propagates_and_caches_nothing() {
    let (cache, _store, _clock) = create_test_cache();

    let result: Result<CacheResult<Vec<Record>>> = cache
      .fetch("items", || async { Err(eyre!("network down")) })
      .await;

    assert!(result.is_err());
    assert!(cache.get::<Vec<Record>, _>("items").is_none());
  }

  #[tokio::test]
  async fn test_fetch_falls_back_to_network_when_storage_fails() {
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);
    store.fail_writes.store(true, Ordering::SeqCst);
    let cache = CacheLayer::new(Arc::clone(&store), "test-cache", "items");

    let result = cache
      .fetch("items", || async { Ok(records(&["a"])) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, records(&["a"]));
  }
}
