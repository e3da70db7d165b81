//! Configuration settings for daybook.
//!
//! Settings are loaded from `~/.daybook/config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DaybookError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Sync engine settings.
    pub sync: SyncConfig,
    /// Connectivity probe settings.
    pub connectivity: ConnectivityConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled drains while online with a non-empty queue.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Quiet period after the last enqueue before a drain starts.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Failed attempts after which a change is dropped as a permanent failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Timeout for a single remote call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Base URL of the dashboard backend.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Seconds between reachability probes.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Connect timeout for a single probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `daybook=debug`. `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions for serde
const fn default_interval_secs() -> u64 {
    30
}

const fn default_debounce_ms() -> u64 {
    1000
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_request_timeout_secs() -> u64 {
    15
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

const fn default_probe_interval_secs() -> u64 {
    10
}

const fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            debounce_ms: default_debounce_ms(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl SyncConfig {
    /// Scheduled drain interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Post-enqueue debounce window.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Per-call remote timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// holds values the engine cannot run with.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, DaybookError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            DaybookError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            DaybookError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or disable the engine.
    fn validate(&self) -> Result<(), DaybookError> {
        if self.sync.max_retries == 0 {
            return Err(DaybookError::Config(
                "sync.max_retries must be at least 1".to_string(),
            ));
        }
        if self.sync.interval_secs == 0 {
            return Err(DaybookError::Config(
                "sync.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.sync.request_timeout_secs == 0 {
            return Err(DaybookError::Config(
                "sync.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
