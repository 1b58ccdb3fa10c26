use thiserror::Error;

/// Failure talking to the content service.
#[derive(Debug, Error)]
pub enum ContentError {
  #[error("invalid content service URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("request to {url} failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("content service returned {status} for {url}")]
  Status {
    url: String,
    status: reqwest::StatusCode,
  },

  #[error("unexpected response from content service: {0}")]
  Decode(String),

  #[error("{kind} '{id}' not found")]
  NotFound { kind: &'static str, id: String },
}
