//! Application configuration management.
//!
//! Configuration is stored at `~/.config/tourdesk/config.json`. The
//! `TOURDESK_API_URL` and `TOURDESK_TOKEN` environment variables take
//! precedence over the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_URL;
use crate::pagination::DEFAULT_PAGE_SIZE;

/// Application name used for config/data directory paths
const APP_NAME: &str = "tourdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "TOURDESK_API_URL";
pub const ENV_TOKEN: &str = "TOURDESK_TOKEN";

const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub cache_ttl_secs: u64,
    pub page_size: u32,
    pub refetch_interval_secs: Option<u64>,
    pub last_email: Option<String>,
    pub log_dir: Option<PathBuf>,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            refetch_interval_secs: None,
            last_email: None,
            log_dir: None,
            token: None,
        }
    }
}

impl Config {
    /// File settings with environment overrides applied.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.token = Some(token);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for persisted preferences.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn refetch_interval(&self) -> Option<Duration> {
        self.refetch_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"page_size": 25}"#).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.refetch_interval(), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_API_URL => Some("https://backoffice.example.com/api".to_string()),
            ENV_TOKEN => Some("abc".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "https://backoffice.example.com/api");
        assert_eq!(config.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_token_is_never_written() {
        let config = Config {
            token: Some("secret".to_string()),
            refetch_interval_secs: Some(0),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert_eq!(config.refetch_interval(), None);
    }
}
