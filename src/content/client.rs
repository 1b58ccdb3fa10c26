use crate::config::ContentConfig;
use crate::content::api_types::{ApiCategory, ApiPrompt, ApiStyle, ApiTimelinePrompt};
use crate::content::error::ContentError;
use crate::content::types::{Category, PromptItem, Style, TimelineItem};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PROMPTS_TABLE: &str = "prompts";
const TIMELINE_TABLE: &str = "timeline_prompts";
const CATEGORIES_TABLE: &str = "categories";
const STYLES_TABLE: &str = "styles";

/// Client for the hosted content service's REST endpoints
#[derive(Clone)]
pub struct ContentClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ContentClient {
  /// Build a client, authenticating with the anon key and, when signed in,
  /// the user's access token.
  pub fn new(config: &ContentConfig, api_key: &str, access_token: Option<&str>) -> Result<Self> {
    let base_url = normalize_base_url(&config.url)?;

    let bearer = access_token.unwrap_or(api_key);
    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid API key: {}", e))?,
    );
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", bearer))
        .map_err(|e| eyre!("Invalid access token: {}", e))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  /// List prompts, newest first, optionally limited to one category
  pub async fn list_items(&self, category: Option<&str>) -> Result<Vec<PromptItem>, ContentError> {
    let filters: Vec<(&str, String)> = category
      .map(|c| ("category", format!("eq.{}", c)))
      .into_iter()
      .collect();

    self
      .select::<ApiPrompt>(PROMPTS_TABLE, &filters)
      .await?
      .into_iter()
      .map(ApiPrompt::into_item)
      .collect()
  }

  /// Get a single prompt by id
  pub async fn get_item(&self, id: &str) -> Result<PromptItem, ContentError> {
    self
      .select_one::<ApiPrompt>(PROMPTS_TABLE, "prompt", id)
      .await?
      .into_item()
  }

  /// List timeline prompts, newest first
  pub async fn list_timeline_items(&self) -> Result<Vec<TimelineItem>, ContentError> {
    self
      .select::<ApiTimelinePrompt>(TIMELINE_TABLE, &[])
      .await?
      .into_iter()
      .map(ApiTimelinePrompt::into_item)
      .collect()
  }

  /// Get a single timeline prompt by id
  pub async fn get_timeline_item(&self, id: &str) -> Result<TimelineItem, ContentError> {
    self
      .select_one::<ApiTimelinePrompt>(TIMELINE_TABLE, "timeline prompt", id)
      .await?
      .into_item()
  }

  pub async fn list_categories(&self) -> Result<Vec<Category>, ContentError> {
    self
      .select::<ApiCategory>(CATEGORIES_TABLE, &[])
      .await?
      .into_iter()
      .map(ApiCategory::into_category)
      .collect()
  }

  pub async fn list_styles(&self) -> Result<Vec<Style>, ContentError> {
    self
      .select::<ApiStyle>(STYLES_TABLE, &[])
      .await?
      .into_iter()
      .map(ApiStyle::into_style)
      .collect()
  }

  async fn select_one<R: DeserializeOwned>(
    &self,
    table: &str,
    kind: &'static str,
    id: &str,
  ) -> Result<R, ContentError> {
    let filters = [("id", format!("eq.{}", id)), ("limit", "1".to_string())];
    self
      .select::<R>(table, &filters)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| ContentError::NotFound {
        kind,
        id: id.to_string(),
      })
  }

  async fn select<R: DeserializeOwned>(
    &self,
    table: &str,
    filters: &[(&str, String)],
  ) -> Result<Vec<R>, ContentError> {
    let url = select_url(&self.base_url, table, filters)?;
    debug!(%url, "fetching from content service");

    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|source| ContentError::Http {
        url: url.to_string(),
        source,
      })?;

    let status = response.status();
    if !status.is_success() {
      return Err(ContentError::Status {
        url: url.to_string(),
        status,
      });
    }

    let body = response.bytes().await.map_err(|source| ContentError::Http {
      url: url.to_string(),
      source,
    })?;

    serde_json::from_slice(&body)
      .map_err(|e| ContentError::Decode(format!("{} rows: {}", table, e)))
  }
}

/// Parse the configured URL so that relative joins append rather than
/// replace its last path segment.
fn normalize_base_url(raw: &str) -> Result<Url> {
  let mut url = Url::parse(raw.trim()).map_err(|e| eyre!("Invalid content URL '{}': {}", raw, e))?;
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

/// REST select URL for `table`, newest rows first.
fn select_url(base: &Url, table: &str, filters: &[(&str, String)]) -> Result<Url, ContentError> {
  let mut url = base.join(&format!("rest/v1/{}", table))?;
  {
    let mut query = url.query_pairs_mut();
    query.append_pair("select", "*");
    for (column, condition) in filters {
      query.append_pair(column, condition);
    }
    query.append_pair("order", "created_at.desc");
  }
  Ok(url)
}
