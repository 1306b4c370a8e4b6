//! Application configuration management.
//!
//! Holds the API location, refresh timing, credential storage backend, and the
//! last email used to log in.
//!
//! Configuration is stored at `~/.config/atelier/config.json`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "atelier";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "ATELIER_BASE_URL";

/// Environment variable overriding `storage`
pub const ENV_STORAGE: &str = "ATELIER_STORAGE";

/// How often the scheduler checks the access token (4 minutes).
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 4 * 60;

/// Refresh once the access token has this long left (5 minutes).
/// Must stay above the interval so no expiry window slips between ticks.
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 5 * 60;

/// Upper bound for the refresh threshold (one day).
const MAX_REFRESH_THRESHOLD_SECS: u64 = 24 * 60 * 60;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the credential is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!(
                "Unknown storage backend '{}' (expected file, keyring or memory)",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin of the storefront API, e.g. `http://localhost:8080`
    pub base_url: String,
    /// Path of the auth endpoints relative to `base_url`
    pub auth_path: String,
    pub refresh_interval_secs: u64,
    pub refresh_threshold_secs: u64,
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    /// Keychain service name for the keyring backend
    pub keyring_service: String,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_path: "/api/auth".to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            keyring_service: APP_NAME.to_string(),
            default_headers: BTreeMap::new(),
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
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

    /// Apply environment overrides; `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(storage) = lookup(ENV_STORAGE) {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be greater than zero");
        }
        if self.refresh_interval_secs >= self.refresh_threshold_secs {
            bail!(
                "refresh_interval_secs ({}) must be shorter than refresh_threshold_secs ({})",
                self.refresh_interval_secs,
                self.refresh_threshold_secs
            );
        }
        if self.refresh_threshold_secs > MAX_REFRESH_THRESHOLD_SECS {
            bail!(
                "refresh_threshold_secs ({}) must not exceed {}",
                self.refresh_threshold_secs,
                MAX_REFRESH_THRESHOLD_SECS
            );
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            bail!("base_url must be an http(s) URL, got '{}'", self.base_url);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_threshold(&self) -> chrono::Duration {
        i64::try_from(self.refresh_threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL of the auth endpoint `name` (`login`, `refresh`, `logout`).
    pub fn auth_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.auth_path.trim_matches('/'),
            name
        )
    }

    /// Resolve a request target against `base_url`; absolute URLs pass through.
    pub fn resolve(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                target.trim_start_matches('/')
            )
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.refresh_interval(), Duration::from_secs(240));
        assert_eq!(config.refresh_threshold(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_interval_must_be_below_threshold() {
        let config = Config {
            refresh_interval_secs: 300,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_is_bounded() {
        let config = Config {
            refresh_threshold_secs: u64::MAX,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.refresh_threshold(), chrono::Duration::MAX);

        let day = Config {
            refresh_threshold_secs: MAX_REFRESH_THRESHOLD_SECS,
            ..Config::default()
        };
        day.validate().expect("one day is allowed");
        assert_eq!(day.refresh_threshold(), chrono::Duration::days(1));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"base_url":"https://shop.example","storage":"keyring"}"#)
                .expect("parse");
        assert_eq!(config.base_url, "https://shop.example");
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.auth_path, "/api/auth");
        assert_eq!(config.refresh_threshold_secs, 300);
    }

    #[test]
    fn test_urls() {
        let config = Config {
            base_url: "https://shop.example/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.auth_url("refresh"), "https://shop.example/api/auth/refresh");
        assert_eq!(config.resolve("/api/orders"), "https://shop.example/api/orders");
        assert_eq!(config.resolve("api/orders"), "https://shop.example/api/orders");
        assert_eq!(config.resolve("https://cdn.example/x"), "https://cdn.example/x");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| match key {
                ENV_BASE_URL => Some("https://staging.example".to_string()),
                ENV_STORAGE => Some("Memory".to_string()),
                _ => None,
            })
            .expect("overrides apply");
        assert_eq!(config.base_url, "https://staging.example");
        assert_eq!(config.storage, StorageBackend::Memory);

        let bad =
            config.apply_env_overrides(|key| (key == ENV_STORAGE).then(|| "disk".to_string()));
        assert!(bad.is_err());
    }
}
