use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::tasks::Backend;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const ENV_API_URL: &str = "QUEUEDASH_API_URL";
pub const ENV_API_TOKEN: &str = "QUEUEDASH_API_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Upper bound for a single request. Submissions and result downloads on
    /// large documents are slow, so this is minutes.
    pub timeout_secs: u64,
    pub refresh_interval_ms: u64,
    pub max_backoff_factor: u32,
    pub skip_when_busy: bool,
    pub desktop_notifications: bool,
    pub toast_duration_ms: u64,
    pub default_backend: Backend,
    pub default_lang: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            timeout_secs: 300,
            refresh_interval_ms: 5000,
            max_backoff_factor: 8,
            skip_when_busy: false,
            desktop_notifications: true,
            toast_duration_ms: 3000,
            default_backend: Backend::Pipeline,
            default_lang: "ch".to_string(),
        }
    }
}

impl Config {
    /// Saved config with environment overrides applied. A missing or
    /// unreadable file yields the defaults.
    pub fn load() -> Self {
        let path = Self::path();
        let config = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Ignoring malformed config file");
                    Config::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("queuedash");
        path.push("config.json");
        path
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token.trim().to_string());
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_service_conventions() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.refresh_interval(), Duration::from_millis(5000));
        assert_eq!(config.default_backend, Backend::Pipeline);
    }

    #[test]
    fn env_overrides_url_and_token() {
        let vars: HashMap<&str, &str> = [
            (ENV_API_URL, " http://queue.internal:9000 "),
            (ENV_API_TOKEN, "secret"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "http://queue.internal:9000");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = Config::default().with_env_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "http://10.0.0.5:8000", "refresh_interval_ms": 2000}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "http://10.0.0.5:8000");
        assert_eq!(config.refresh_interval_ms, 2000);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.desktop_notifications);
    }
}
