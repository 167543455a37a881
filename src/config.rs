//! Configuration loader and validator for the moderation console.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::store::QueryKey;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub api: Api,
    pub queues: Queues,
    #[serde(default)]
    pub emoji: Emoji,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    /// Raw `Cookie` header value carrying the admin session, if any.
    #[serde(default)]
    pub session_cookie: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Paging parameters shared by every moderation queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queues {
    pub page_size: u32,
    pub sort: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Emoji {
    pub enabled: bool,
}

impl Default for Emoji {
    fn default() -> Self {
        Emoji { enabled: true }
    }
}

impl Config {
    /// Query identity for the queue named `name` using the configured paging.
    pub fn query_key(&self, name: &str) -> QueryKey {
        QueryKey::new(name, self.queues.page_size, &self.queues.sort)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let base = cfg.api.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Invalid("api.base_url must be an http(s) URL"));
    }
    if let Some(cookie) = &cfg.api.session_cookie {
        if cookie.trim().is_empty() {
            return Err(ConfigError::Invalid("api.session_cookie must be non-empty when set"));
        }
    }

    if cfg.queues.page_size == 0 || cfg.queues.page_size > 100 {
        return Err(ConfigError::Invalid("queues.page_size must be within 1..=100"));
    }
    if cfg.queues.sort.trim().is_empty() {
        return Err(ConfigError::Invalid("queues.sort must be non-empty"));
    }

    Ok(())
}

/// Returns the reference YAML configuration.
pub fn example() -> &'static str {
    r#"api:
  base_url: "http://localhost:8090"
  session_cookie: "accessToken=YOUR_ADMIN_SESSION"

queues:
  page_size: 10
  sort: "createdAt,asc"

emoji:
  enabled: true
"#
}
