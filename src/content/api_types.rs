//! Serde-deserializable types matching the content service's rows.
//!
//! These types are separate from domain types to allow lenient deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::error::ContentError;
use super::types::{Category, PromptItem, Style, TimelineItem, TimelineSegment};

/// Row ids may be integers or uuid strings depending on the table.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Text(String),
    Number(i64),
  }

  Ok(match RawId::deserialize(deserializer)? {
    RawId::Text(s) => s,
    RawId::Number(n) => n.to_string(),
  })
}

/// Treat `null` the same as a missing column.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a Postgres timestamp, with or without an offset.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ContentError> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Ok(dt.with_timezone(&Utc));
  }
  // timestamptz rendered as "2024-01-01 10:00:00+00"
  if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
    return Ok(dt.with_timezone(&Utc));
  }
  // timestamp without time zone, assumed UTC
  ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|dt| dt.and_utc())
    .ok_or_else(|| ContentError::Decode(format!("invalid timestamp '{}'", raw)))
}

// ============================================================================
// prompts
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPrompt {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub title: String,
  #[serde(default, deserialize_with = "null_as_default", alias = "prompt_text")]
  pub prompt: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub category: String,
  #[serde(default)]
  pub style: Option<String>,
  #[serde(default)]
  pub thumbnail_url: Option<String>,
  #[serde(default)]
  pub video_url: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub tags: Vec<String>,
  pub created_at: String,
}

// ============================================================================
// timeline_prompts
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSegment {
  #[serde(alias = "start_seconds", alias = "start_time")]
  pub start: f64,
  #[serde(alias = "end_seconds", alias = "end_time")]
  pub end: f64,
  #[serde(default, deserialize_with = "null_as_default")]
  pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiTimelinePrompt {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub title: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub category: String,
  #[serde(default, deserialize_with = "null_as_default", alias = "timeline")]
  pub segments: Vec<ApiSegment>,
  pub created_at: String,
}

// ============================================================================
// categories / styles
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCategory {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub slug: Option<String>,
  pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiStyle {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  pub name: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub category: String,
  pub created_at: String,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiPrompt {
  pub fn into_item(self) -> Result<PromptItem, ContentError> {
    Ok(PromptItem {
      created_at: parse_timestamp(&self.created_at)?,
      id: self.id,
      title: self.title,
      prompt: self.prompt,
      category: self.category,
      style: self.style.filter(|s| !s.is_empty()),
      thumbnail_url: self.thumbnail_url,
      video_url: self.video_url,
      tags: self.tags,
    })
  }
}

impl ApiTimelinePrompt {
  pub fn into_item(self) -> Result<TimelineItem, ContentError> {
    let mut segments: Vec<TimelineSegment> = self
      .segments
      .into_iter()
      .map(|s| TimelineSegment {
        start_seconds: s.start,
        end_seconds: s.end,
        prompt: s.prompt,
      })
      .collect();
    segments.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));

    Ok(TimelineItem {
      created_at: parse_timestamp(&self.created_at)?,
      id: self.id,
      title: self.title,
      category: self.category,
      segments,
    })
  }
}

impl ApiCategory {
  pub fn into_category(self) -> Result<Category, ContentError> {
    let slug = self
      .slug
      .filter(|s| !s.is_empty())
      .unwrap_or_else(|| slugify(&self.name));
    Ok(Category {
      created_at: parse_timestamp(&self.created_at)?,
      id: self.id,
      name: self.name,
      slug,
    })
  }
}

impl ApiStyle {
  pub fn into_style(self) -> Result<Style, ContentError> {
    Ok(Style {
      created_at: parse_timestamp(&self.created_at)?,
      id: self.id,
      name: self.name,
      category: self.category,
    })
  }
}

/// Lowercase, dash-separated form of a display name.
fn slugify(name: &str) -> String {
  name
    .split(|c: char| !c.is_alphanumeric())
    .filter(|part| !part.is_empty())
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join("-")
}
