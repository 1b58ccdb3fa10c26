use crate::cache::is_valid_segment;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub content: ContentConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
  /// Base URL of the hosted content service
  pub url: String,
  /// Environment variable holding the anon API key
  #[serde(default = "default_api_key_env")]
  pub api_key_env: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Disable to always hit the network
  pub enabled: bool,
  /// Clear both caches on every start
  pub clear_on_load: bool,
  /// Key prefix reserved for cache entries in the local store
  pub prefix: String,
  /// Keep the local store on disk rather than in memory
  pub persist: bool,
  /// Store location (defaults to the user data directory)
  pub path: Option<PathBuf>,
  pub items: CachePolicy,
  pub timeline: CachePolicy,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      clear_on_load: true,
      prefix: "promptlib-cache".to_string(),
      persist: true,
      path: None,
      items: CachePolicy::default(),
      timeline: CachePolicy::default(),
    }
  }
}

/// Freshness window and version tag for one kind of content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
  pub freshness_secs: u64,
  pub version: String,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      freshness_secs: 300,
      version: "v1".to_string(),
    }
  }
}

impl CachePolicy {
  pub fn freshness(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.freshness_secs.min(MAX_FRESHNESS_SECS) as i64)
  }
}

/// Ten years; anything longer is clamped.
const MAX_FRESHNESS_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_api_key_env() -> String {
  "PROMPTLIB_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./promptlib.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/promptlib/config.yaml
  /// 4. ~/.config/promptlib/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/promptlib/config.yaml\n\
                 with at least:\n  content:\n    url: https://<project>.supabase.co"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("promptlib.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("promptlib").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    // ~/.config on platforms where config_dir lives elsewhere
    if let Some(home) = dirs::home_dir() {
      let dot_config = home.join(".config").join("promptlib").join("config.yaml");
      if dot_config.exists() {
        return Some(dot_config);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if !is_valid_segment(&config.cache.prefix) {
      return Err(eyre!(
        "cache.prefix must be non-empty and must not contain ':'"
      ));
    }
    for (kind, policy) in [("items", &config.cache.items), ("timeline", &config.cache.timeline)] {
      if !is_valid_segment(&policy.version) {
        return Err(eyre!(
          "cache.{}.version must be non-empty and must not contain ':'",
          kind
        ));
      }
    }
    Ok(config)
  }

  /// Get the content service API key from the environment.
  ///
  /// Checks the configured variable first, then PROMPTLIB_API_KEY as fallback.
  pub fn get_api_key(content: &ContentConfig) -> Result<String> {
    std::env::var(&content.api_key_env)
      .or_else(|_| std::env::var(default_api_key_env()))
      .map_err(|_| {
        eyre!(
          "Content service API key not found. Set {} or PROMPTLIB_API_KEY environment variable.",
          content.api_key_env
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("content:\n  url: https://example.test\n").unwrap();

    assert_eq!(config.content.api_key_env, "PROMPTLIB_API_KEY");
    assert_eq!(config.content.timeout_secs, 15);
    assert!(config.cache.enabled);
    assert!(config.cache.clear_on_load);
    assert!(config.cache.persist);
    assert_eq!(config.cache.prefix, "promptlib-cache");
    assert_eq!(config.cache.items, CachePolicy::default());
    assert_eq!(config.cache.timeline.freshness(), chrono::Duration::seconds(300));
  }

  #[test]
  fn test_per_kind_policies() {
    let yaml = r#"
content:
  url: https://example.test
cache:
  clear_on_load: false
  items:
    freshness_secs: 60
  timeline:
    version: v3
"#;
    let config = Config::parse(yaml).unwrap();

    assert!(!config.cache.clear_on_load);
    assert_eq!(config.cache.items.freshness_secs, 60);
    assert_eq!(config.cache.items.version, "v1");
    assert_eq!(config.cache.timeline.freshness_secs, 300);
    assert_eq!(config.cache.timeline.version, "v3");
  }

  #[test]
  fn test_rejects_separator_in_namespace_parts() {
    let yaml = "content:\n  url: https://example.test\ncache:\n  timeline:\n    version: 'a:b'\n";
    assert!(Config::parse(yaml).is_err());

    let yaml = "content:\n  url: https://example.test\ncache:\n  prefix: ''\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_missing_content_section_is_an_error() {
    assert!(Config::parse("cache:\n  enabled: false\n").is_err());
  }

  #[test]
  fn test_explicit_missing_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/promptlib.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
