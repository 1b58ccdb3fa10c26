//! Cache keys for content collections and records.

use sha2::{Digest, Sha256};

use crate::cache::{CacheKey, Cacheable};

use super::types::{PromptItem, TimelineItem};

/// Keys for everything the content client caches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentKey {
  /// Prompt list, optionally filtered by category slug
  Items { category: Option<String> },
  /// A single prompt
  Item { id: String },
  /// Timeline prompt list
  TimelineItems,
  /// A single timeline prompt
  TimelineItem { id: String },
  Categories,
  Styles,
}

impl CacheKey for ContentKey {
  fn cache_key(&self) -> String {
    match self {
      Self::Items { category: None } => "items".to_string(),
      Self::Items {
        category: Some(category),
      } => format!("items:category:{}", normalize_slug(category)),
      Self::Item { id } => format!("item:{}", hash_id(id)),
      Self::TimelineItems => "timeline-items".to_string(),
      Self::TimelineItem { id } => format!("timeline-item:{}", hash_id(id)),
      Self::Categories => "categories".to_string(),
      Self::Styles => "styles".to_string(),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Items { category: None } => "all prompts".to_string(),
      Self::Items {
        category: Some(category),
      } => format!("prompts in {}", category),
      Self::Item { id } => format!("prompt {}", id),
      Self::TimelineItems => "all timeline prompts".to_string(),
      Self::TimelineItem { id } => format!("timeline prompt {}", id),
      Self::Categories => "categories".to_string(),
      Self::Styles => "styles".to_string(),
    }
  }
}

/// Content records that also live in the per-record sub-cache.
pub trait ContentRecord: Cacheable {
  fn record_id(&self) -> &str;

  fn key_for(id: &str) -> ContentKey;
}

impl ContentRecord for PromptItem {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn key_for(id: &str) -> ContentKey {
    ContentKey::Item { id: id.to_string() }
  }
}

impl ContentRecord for TimelineItem {
  fn record_id(&self) -> &str {
    &self.id
  }

  fn key_for(id: &str) -> ContentKey {
    ContentKey::TimelineItem { id: id.to_string() }
  }
}

/// Record ids are arbitrary text; hash them into fixed-length key segments.
fn hash_id(id: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(id.as_bytes());
  hex::encode(hasher.finalize())
}

/// Canonical form of a category slug, used both in cache keys and in the
/// query sent to the service.
pub fn normalize_slug(slug: &str) -> String {
  slug.trim().to_lowercase()
}
