// Configuration source loading.
//
// Priority order:
// 1. Environment variables (VIEWCOUNT_* prefix)
// 2. Config file path from VIEWCOUNT_CONFIG
// 3. Inline config content from VIEWCOUNT_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.viewcount.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use tracing::warn;

/// Load configuration using the host environment and default file locations.
pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("VIEWCOUNT_CONFIG") {
        return read_toml_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("VIEWCOUNT_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from VIEWCOUNT_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in &["./config.toml", "./.viewcount.toml"] {
        let path = Path::new(path);
        if path.exists() {
            return read_toml_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_toml_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path.
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();
    config.merge(read_toml_file(path.as_ref())?);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;

    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    match load_from_file() {
        Ok(Some(file_config)) => config.merge(file_config),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable config file, using defaults"),
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;

    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}
