//! Configuration loading and persistence.
//!
//! Settings live in `<config dir>/config.json` and can be overridden per
//! process with `MANGAHUB_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::constants::{CHAT_PATH, DEFAULT_HISTORY_LIMIT};
use crate::ws::{http_to_ws_scheme, ws_to_http_scheme};

/// File name of the config document inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// Keys accepted by `mangahub config <key> <value>`.
pub const KEYS: &[&str] = &["server_url", "history_limit"];

/// Configuration for the mangahub CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat server (http, https, ws or wss).
    pub server_url: String,
    /// Messages fetched by `/history` and `mangahub history`.
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:9093".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `MANGAHUB_CONFIG_DIR` wins; otherwise the platform config dir
    /// (Linux: `~/.config/mangahub`).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("MANGAHUB_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("mangahub")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = match Self::load_from(&dir) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {e:#}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `config.json` from `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            anyhow::bail!("Config file not found");
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("MANGAHUB_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(limit) = std::env::var("MANGAHUB_HISTORY_LIMIT") {
            match limit.parse::<usize>() {
                Ok(limit) if limit > 0 => self.history_limit = limit,
                _ => log::warn!("Ignoring invalid MANGAHUB_HISTORY_LIMIT={limit}"),
            }
        }
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Write `config.json` into `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        // Owner read/write only
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Value of one setting, rendered for display.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "server_url" => Some(self.server_url.clone()),
            "history_limit" => Some(self.history_limit.to_string()),
            _ => None,
        }
    }

    /// Update one setting from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server_url" => {
                let value = value.trim().trim_end_matches('/');
                if !["http://", "https://", "ws://", "wss://"]
                    .iter()
                    .any(|scheme| value.starts_with(scheme))
                {
                    anyhow::bail!("server_url must start with http://, https://, ws:// or wss://");
                }
                self.server_url = value.to_string();
            }
            "history_limit" => {
                let limit: usize = value
                    .trim()
                    .parse()
                    .with_context(|| format!("history_limit must be a number, got {value:?}"))?;
                if limit == 0 {
                    anyhow::bail!("history_limit must be at least 1");
                }
                self.history_limit = limit;
            }
            other => anyhow::bail!("Unknown config key {other:?} (expected one of: {})", KEYS.join(", ")),
        }
        Ok(())
    }

    /// Chat WebSocket endpoint, e.g. `ws://localhost:9093/chat`.
    pub fn chat_url(&self) -> String {
        let base = http_to_ws_scheme(self.server_url.trim_end_matches('/'));
        format!("{base}{CHAT_PATH}")
    }

    /// HTTP base URL for REST calls such as chat history.
    pub fn http_url(&self) -> String {
        ws_to_http_scheme(self.server_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:9093");
        assert_eq!(config.history_limit, 20);
    }

    #[test]
    fn test_derived_urls() {
        let mut config = Config::default();
        assert_eq!(config.chat_url(), "ws://localhost:9093/chat");
        assert_eq!(config.http_url(), "http://localhost:9093");

        config.server_url = "https://manga.example.com/".to_string();
        assert_eq!(config.chat_url(), "wss://manga.example.com/chat");
        assert_eq!(config.http_url(), "https://manga.example.com");

        config.server_url = "ws://10.0.0.5:9093".to_string();
        assert_eq!(config.chat_url(), "ws://10.0.0.5:9093/chat");
        assert_eq!(config.http_url(), "http://10.0.0.5:9093");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            server_url: "http://chat.local:9000".to_string(),
            history_limit: 50,
        };
        config.save_to(dir.path()).unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(dir.path().join(CONFIG_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{"history_limit": 5}"#).unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.server_url, "http://localhost:9093");
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_load_applies_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MANGAHUB_CONFIG_DIR", dir.path());
        std::env::set_var("MANGAHUB_SERVER_URL", "http://override:1234");
        std::env::set_var("MANGAHUB_HISTORY_LIMIT", "7");

        let config = Config::load().unwrap();

        std::env::remove_var("MANGAHUB_CONFIG_DIR");
        std::env::remove_var("MANGAHUB_SERVER_URL");
        std::env::remove_var("MANGAHUB_HISTORY_LIMIT");

        assert_eq!(config.server_url, "http://override:1234");
        assert_eq!(config.history_limit, 7);
    }

    #[test]
    fn test_invalid_history_limit_env_is_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MANGAHUB_HISTORY_LIMIT", "lots");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("MANGAHUB_HISTORY_LIMIT");
        assert_eq!(config.history_limit, 20);
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("server_url", "https://example.com/").unwrap();
        assert_eq!(config.get("server_url").as_deref(), Some("https://example.com"));
        config.set("history_limit", "42").unwrap();
        assert_eq!(config.get("history_limit").as_deref(), Some("42"));

        assert!(config.set("history_limit", "0").is_err());
        assert!(config.set("history_limit", "many").is_err());
        assert!(config.set("server_url", "ftp://example.com").is_err());
        assert!(config.set("token", "x").is_err());
        assert!(config.get("token").is_none());
    }
}
