//! Application shell: builds the cached client and wires lifecycle events
//! to cache invalidation.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheLayer, KeyValueStore, MemoryStore, SqliteStore};
use crate::config::{CacheConfig, CachePolicy, Config};
use crate::content::cached_client::{CachedContentClient, ContentCache};
use crate::content::client::ContentClient;

/// Store key holding the signed-in user's access token.
pub const SESSION_TOKEN_KEY: &str = "promptlib-session:token";

/// Application events the cache reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Process start; clears the caches only when configured to
  AppLoad,
  /// User signed out
  SignOut,
  /// User asked for a cache clear
  ClearRequested,
}

/// Owns the local store and the cached client for one run.
pub struct Session {
  store: Arc<dyn KeyValueStore>,
  content: CachedContentClient,
}

impl Session {
  /// Build a session from configuration, opening the local store.
  pub fn from_config(config: &Config) -> Result<Self> {
    let store = open_store(&config.cache)?;
    let api_key = Config::get_api_key(&config.content)?;
    let token = store
      .get(SESSION_TOKEN_KEY)
      .map_err(|e| eyre!("Failed to read session: {}", e))?;
    let client = ContentClient::new(&config.content, &api_key, token.as_deref())?;

    Ok(Self::assemble(store, client, &config.cache))
  }

  /// Build both caches over `store`.
  ///
  /// A disabled cache still sits on the real store so that sign-out and
  /// explicit clears remove what earlier runs persisted.
  fn assemble(store: Arc<dyn KeyValueStore>, client: ContentClient, config: &CacheConfig) -> Self {
    if !config.enabled {
      debug!("cache disabled, every read goes to the network");
    }
    let items = build_cache(&store, config, "items", &config.items);
    let timeline = build_cache(&store, config, "timeline", &config.timeline);

    Self::new(store, CachedContentClient::new(client, items, timeline))
  }

  pub fn new(store: Arc<dyn KeyValueStore>, content: CachedContentClient) -> Self {
    Self { store, content }
  }

  pub fn content(&self) -> &CachedContentClient {
    &self.content
  }

  /// Explicit startup call; run once before any content is read.
  pub fn start(&self) {
    self.dispatch(Lifecycle::AppLoad);
  }

  /// Whether an access token is stored.
  pub fn is_signed_in(&self) -> bool {
    matches!(self.store.get(SESSION_TOKEN_KEY), Ok(Some(_)))
  }

  /// Store an access token issued by the auth service.
  pub fn sign_in(&self, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
      return Err(eyre!("Access token must not be empty"));
    }
    self
      .store
      .set(SESSION_TOKEN_KEY, token)
      .map_err(|e| eyre!("Failed to store session: {}", e))?;
    // Cached content may have been fetched with anonymous access
    self.dispatch(Lifecycle::ClearRequested);
    info!("signed in");
    Ok(())
  }

  /// Forget the access token and drop all cached content.
  ///
  /// The caches are cleared even when the token can't be removed.
  pub fn sign_out(&self) -> Result<()> {
    let removed = self.store.remove(SESSION_TOKEN_KEY);
    self.dispatch(Lifecycle::SignOut);
    removed.map_err(|e| eyre!("Failed to remove session: {}", e))?;
    info!("signed out");
    Ok(())
  }

  pub fn clear_cache(&self) {
    self.dispatch(Lifecycle::ClearRequested);
  }

  pub fn dispatch(&self, event: Lifecycle) {
    debug!(?event, "lifecycle event");
    match event {
      Lifecycle::AppLoad => self.content.initialize(),
      Lifecycle::SignOut | Lifecycle::ClearRequested => self.content.invalidate_all(),
    }
  }
}

fn open_store(config: &CacheConfig) -> Result<Arc<dyn KeyValueStore>> {
  if !config.persist {
    return Ok(Arc::new(MemoryStore::new()));
  }

  let path = match &config.path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path().ok_or_else(|| eyre!("Could not determine data directory"))?,
  };
  let store = SqliteStore::open(&path)
    .map_err(|e| eyre!("Failed to open local store at {}: {}", path.display(), e))?;
  Ok(Arc::new(store))
}

fn build_cache(
  store: &Arc<dyn KeyValueStore>,
  config: &CacheConfig,
  kind: &str,
  policy: &CachePolicy,
) -> ContentCache {
  CacheLayer::new(Arc::clone(store), &config.prefix, kind)
    .with_freshness(policy.freshness())
    .with_version(policy.version.clone())
    .with_clear_on_load(config.clear_on_load)
    .with_enabled(config.enabled)
}
