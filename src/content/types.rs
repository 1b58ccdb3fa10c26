use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single prompt in the flat library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
  pub id: String,
  pub title: String,
  pub prompt: String,
  pub category: String,
  pub style: Option<String>,
  pub thumbnail_url: Option<String>,
  pub video_url: Option<String>,
  pub tags: Vec<String>,
  pub created_at: DateTime<Utc>,
}

/// A prompt split into timed segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
  pub id: String,
  pub title: String,
  pub category: String,
  pub segments: Vec<TimelineSegment>, // ordered by start_seconds
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
  pub start_seconds: f64,
  pub end_seconds: f64,
  pub prompt: String,
}

impl TimelineItem {
  /// Total length covered by the segments.
  pub fn duration_seconds(&self) -> f64 {
    self
      .segments
      .iter()
      .map(|s| s.end_seconds)
      .fold(0.0, f64::max)
  }
}

/// Category used to group prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: String,
  pub name: String,
  pub slug: String,
  pub created_at: DateTime<Utc>,
}

/// Visual style a prompt can be tagged with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
  pub id: String,
  pub name: String,
  pub category: String,
  pub created_at: DateTime<Utc>,
}
