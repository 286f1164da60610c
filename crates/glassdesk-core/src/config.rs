//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, the last username, which durable store holds the
//! session, and the session timing parameters.
//!
//! Configuration is stored at `~/.config/glassdesk/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::auth::{FileStore, KeyringStore, SessionStore};
use crate::session::SessionTimeouts;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "glassdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "GLASSDESK_API_URL";

/// Where the session token and last-activity timestamp are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    pub storage: StorageBackend,
    pub session: SessionTimeouts,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL for the REST API: environment, then config, then default.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    /// Open the configured session store.
    pub fn open_store(&self) -> Result<Box<dyn SessionStore>> {
        Ok(match self.storage {
            StorageBackend::File => Box::new(FileStore::new(self.cache_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringStore::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"last_username": "abbas", "storage": "keyring"}"#).unwrap();

        assert_eq!(config.last_username.as_deref(), Some("abbas"));
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.session, SessionTimeouts::default());
    }

    #[test]
    fn test_session_overrides_are_read() {
        let config: Config = serde_json::from_str(
            r#"{"session": {"inactivity_timeout_secs": 300, "warning_lead_secs": 30}}"#,
        )
        .unwrap();

        assert_eq!(config.session.inactivity_timeout_secs, 300);
        assert_eq!(config.session.warning_lead_secs, 30);
        assert_eq!(config.session.expiry_poll_secs, 30);
    }

    #[test]
    fn test_configured_base_url_is_used_without_env() {
        let config = Config {
            api_base_url: Some("https://glass.example/api".to_string()),
            ..Default::default()
        };
        if std::env::var(API_URL_ENV).is_err() {
            assert_eq!(config.api_base_url(), "https://glass.example/api");
        }
    }
}
