//! Content client with transparent caching.

use color_eyre::{Report, Result};
use tracing::debug;

use crate::cache::{CacheLayer, CacheSource, KeyValueStore};

use super::cache::{normalize_slug, ContentKey, ContentRecord};
use super::client::ContentClient;
use super::types::{Category, PromptItem, Style, TimelineItem};

/// Cache layer over a shared, runtime-selected store.
pub type ContentCache = CacheLayer<dyn KeyValueStore>;

/// Content client with transparent caching support.
///
/// Flat prompts (plus the category and style lists) and timeline prompts
/// live in two independent caches, each with its own freshness window and
/// version tag. List responses also seed the per-record sub-cache.
#[derive(Clone)]
pub struct CachedContentClient {
  inner: ContentClient,
  items: ContentCache,
  timeline: ContentCache,
}

impl CachedContentClient {
  pub fn new(inner: ContentClient, items: ContentCache, timeline: ContentCache) -> Self {
    Self {
      inner,
      items,
      timeline,
    }
  }

  /// Cache holding prompts, categories and styles.
  pub fn items_cache(&self) -> &ContentCache {
    &self.items
  }

  /// Cache holding timeline prompts.
  pub fn timeline_cache(&self) -> &ContentCache {
    &self.timeline
  }

  /// Run both caches' startup hooks.
  pub fn initialize(&self) {
    self.items.initialize();
    self.timeline.initialize();
  }

  /// Drop everything from both caches.
  pub fn invalidate_all(&self) {
    self.items.invalidate_all();
    self.timeline.invalidate_all();
  }

  /// List prompts, optionally filtered by category slug.
  ///
  /// The slug is normalized once, so the cache key and the request always
  /// describe the same query. A blank slug means no filter.
  pub async fn list_items(&self, category: Option<&str>) -> Result<Vec<PromptItem>> {
    let category = category.map(normalize_slug).filter(|slug| !slug.is_empty());
    let key = ContentKey::Items {
      category: category.clone(),
    };

    let result = self
      .items
      .fetch(&key, || {
        let inner = self.inner.clone();
        async move {
          inner
            .list_items(category.as_deref())
            .await
            .map_err(Report::from)
        }
      })
      .await?;

    debug!(source = ?result.source, count = result.data.len(), "loaded prompts");
    if result.source == CacheSource::Network {
      seed_records(&self.items, &result.data);
    }
    Ok(result.data)
  }

  /// Get a single prompt by id.
  pub async fn get_item(&self, id: &str) -> Result<PromptItem> {
    let result = self
      .items
      .fetch(&PromptItem::key_for(id), || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.get_item(&id).await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  /// List timeline prompts.
  pub async fn list_timeline_items(&self) -> Result<Vec<TimelineItem>> {
    let result = self
      .timeline
      .fetch(&ContentKey::TimelineItems, || {
        let inner = self.inner.clone();
        async move { inner.list_timeline_items().await.map_err(Report::from) }
      })
      .await?;

    debug!(source = ?result.source, count = result.data.len(), "loaded timeline prompts");
    if result.source == CacheSource::Network {
      seed_records(&self.timeline, &result.data);
    }
    Ok(result.data)
  }

  /// Get a single timeline prompt by id.
  pub async fn get_timeline_item(&self, id: &str) -> Result<TimelineItem> {
    let result = self
      .timeline
      .fetch(&TimelineItem::key_for(id), || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.get_timeline_item(&id).await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  pub async fn list_categories(&self) -> Result<Vec<Category>> {
    let result = self
      .items
      .fetch(&ContentKey::Categories, || {
        let inner = self.inner.clone();
        async move { inner.list_categories().await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }

  pub async fn list_styles(&self) -> Result<Vec<Style>> {
    let result = self
      .items
      .fetch(&ContentKey::Styles, || {
        let inner = self.inner.clone();
        async move { inner.list_styles().await.map_err(Report::from) }
      })
      .await?;

    Ok(result.data)
  }
}

/// Store each record of a freshly fetched list under its own key.
fn seed_records<T: ContentRecord>(cache: &ContentCache, records: &[T]) {
  for record in records {
    cache.put(&T::key_for(record.record_id()), record);
  }
}
