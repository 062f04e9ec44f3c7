//! Application configuration management.
//!
//! This module loads the agent configuration: the backend origin plus the
//! tracker timing knobs (idle timeout, debounce window, display ticker
//! interval).
//!
//! Configuration is stored at `~/.config/pulsetrack/config.json`. The
//! `PULSETRACK_ORIGIN` environment variable overrides the configured origin.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

/// Application name used for config directory paths
const APP_NAME: &str = "pulsetrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default backend deployment when no config or override is present
const DEFAULT_ORIGIN: &str = "https://app.pulsetrack.dev";

/// Environment variable overriding the origin
const ORIGIN_ENV_VAR: &str = "PULSETRACK_ORIGIN";

/// Idle timeout in seconds.
/// One minute of silence ends the active session.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Debounce window in seconds.
/// Repeat events for the same file inside this window are suppressed so rapid
/// cursor movement does not flood the backend.
const DEFAULT_DEBOUNCE_SECS: u64 = 120;

/// Elapsed-time display refresh interval in seconds.
const DEFAULT_TICKER_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub idle_timeout_secs: u64,
    pub debounce_secs: u64,
    pub ticker_interval_secs: u64,
    /// File-name prefixes that never count as activity (internal panes etc.)
    pub excluded_file_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            ticker_interval_secs: DEFAULT_TICKER_INTERVAL_SECS,
            excluded_file_prefixes: vec!["extension-output".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config: Self = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };

        if let Ok(origin) = std::env::var(ORIGIN_ENV_VAR) {
            if !origin.is_empty() {
                config.origin = origin;
            }
        }

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// API endpoint derived from the origin
    pub fn api_url(&self) -> String {
        format!("{}/api/graphql", self.origin.trim_end_matches('/'))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ticker_interval_secs)
    }
}
