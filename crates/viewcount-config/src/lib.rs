// viewcount-config - Runtime configuration for the view-count pipeline
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from VIEWCOUNT_CONFIG env var
// 3. Config file contents from VIEWCOUNT_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.viewcount.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub flush: FlushConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deduplication window configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Fixed dedup window. Unset means a repeat view is suppressed only until
    /// the next flush drains the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<u64>,
}

impl DedupConfig {
    pub fn window(&self) -> Option<Duration> {
        self.window_secs.map(Duration::from_secs)
    }
}

/// Flush cycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    pub interval_secs: u64,
    pub item_timeout_ms: u64,
    /// Persist one durable view record per (item, user) alongside the counter
    pub record_views: bool,
    /// Consecutive partially failed cycles before failures are logged as errors
    pub escalate_after_cycles: u32,
}

impl FlushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            item_timeout_ms: 5_000,
            record_views: false,
            escalate_after_cycles: 3,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from an explicit file path, then apply env overrides
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration, falling back to defaults when a config file is unreadable
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Parse inline TOML and layer it over the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: RuntimeConfig = toml::from_str(content)?;
        let mut config = RuntimeConfig::default();
        config.merge(parsed);
        Ok(config)
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.dedup = other.dedup;
        self.flush = other.flush;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
