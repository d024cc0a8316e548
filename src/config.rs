//! Configuration loading and persistence.
//!
//! Reads `config.json` from the configuration directory and applies
//! environment overrides on top. The bearer token is never written to disk;
//! it comes from the environment or from durable local storage.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf, time::Duration};

use crate::constants;
use crate::storage::KeyValueStore;

/// Configuration for the push lifecycle engine.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Base URL of the authority service (no trailing slash).
    pub authority_url: String,
    /// Bearer token - NOT serialized to disk.
    #[serde(skip)]
    pub token: String,
    /// App id of the third-party push SDK. Empty disables that provider.
    pub sdk_app_id: String,
    /// Location of the third-party push SDK script.
    pub sdk_script_url: String,
    /// Script URL of the push service worker.
    pub service_worker_path: String,
    /// Seconds between liveness checks.
    pub health_check_interval_secs: u64,
    /// Seconds between heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Seconds before the first heartbeat after monitoring starts.
    pub initial_heartbeat_delay_secs: u64,
    /// Per-request timeout for authority calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authority_url: constants::DEFAULT_AUTHORITY_URL.to_string(),
            token: String::new(),
            sdk_app_id: String::new(),
            sdk_script_url: constants::SDK_SCRIPT_URL.to_string(),
            service_worker_path: constants::SERVICE_WORKER_PATH.to_string(),
            health_check_interval_secs: constants::HEALTH_CHECK_INTERVAL.as_secs(),
            heartbeat_interval_secs: constants::HEARTBEAT_INTERVAL.as_secs(),
            initial_heartbeat_delay_secs: constants::INITIAL_HEARTBEAT_DELAY.as_secs(),
            request_timeout_secs: constants::HTTP_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `PUSH_LIFECYCLE_CONFIG_DIR` env var
    /// 2. Platform config dir (e.g. `~/.config/push-lifecycle`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(custom_dir) = std::env::var("PUSH_LIFECYCLE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("push-lifecycle")
        };
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {e}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            anyhow::bail!("Config file not found");
        }
        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PUSH_AUTHORITY_URL") {
            self.authority_url = url;
        }

        if let Ok(token) = std::env::var("PUSH_AUTHORITY_TOKEN") {
            self.token = token;
        }

        if let Ok(app_id) = std::env::var("PUSH_SDK_APP_ID") {
            self.sdk_app_id = app_id;
        }

        if let Some(secs) = env_secs("PUSH_HEALTH_CHECK_SECS") {
            self.health_check_interval_secs = secs;
        }

        if let Some(secs) = env_secs("PUSH_HEARTBEAT_SECS") {
            self.heartbeat_interval_secs = secs;
        }

        if let Some(secs) = env_secs("PUSH_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs;
        }

        self.authority_url = self.authority_url.trim_end_matches('/').to_string();
    }

    /// Saves the configuration to file (token excluded).
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&config_path, perms)
                .context("Failed to set config file permissions")?;
        }

        Ok(())
    }

    /// Fill in the token from durable storage when the environment did not
    /// provide one.
    pub fn resolve_token(&mut self, store: &dyn KeyValueStore) {
        if !self.token.is_empty() {
            return;
        }
        match store.get(constants::AUTH_TOKEN_STORAGE_KEY) {
            Ok(Some(token)) => self.token = token,
            Ok(None) => log::debug!("No bearer token in storage"),
            Err(e) => log::warn!("Failed to read bearer token from storage: {e}"),
        }
    }

    /// Whether a bearer token is available.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Whether the third-party SDK provider is configured for this deployment.
    pub fn sdk_enabled(&self) -> bool {
        !self.sdk_app_id.trim().is_empty()
    }

    /// Interval between liveness checks.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    /// Interval between heartbeats.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Delay before the first heartbeat.
    pub fn initial_heartbeat_delay(&self) -> Duration {
        Duration::from_secs(self.initial_heartbeat_delay_secs)
    }

    /// Per-request timeout for authority calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn env_secs(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(secs) => Some(secs),
        Err(e) => {
            log::warn!("Ignoring {name}={raw}: {e}");
            None
        }
    }
}
