use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "VIEWCOUNT_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Look up `key` with the VIEWCOUNT_ prefix applied.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Dedup window; 0 or empty clears it back to "until next flush"
    if let Some(raw) = get_env_string(env, "DEDUP_WINDOW_SECS")? {
        config.dedup.window_secs = match raw.trim() {
            "" | "0" | "none" => None,
            value => Some(
                value
                    .parse::<u64>()
                    .map_err(|e| anyhow!("Failed to parse {}DEDUP_WINDOW_SECS: {}", ENV_PREFIX, e))?,
            ),
        };
    }

    // Flush configuration
    if let Some(val) = get_env_u64(env, "FLUSH_INTERVAL_SECS")? {
        config.flush.interval_secs = val;
    }
    if let Some(val) = get_env_u64(env, "FLUSH_ITEM_TIMEOUT_MS")? {
        config.flush.item_timeout_ms = val;
    }
    if let Some(val) = get_env_bool(env, "RECORD_VIEWS")? {
        config.flush.record_views = val;
    }
    if let Some(val) = get_env_u32(env, "ESCALATE_AFTER_CYCLES")? {
        config.flush.escalate_after_cycles = val;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.logging.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.logging.log_format = format
            .parse::<LogFormat>()
            .context("Invalid VIEWCOUNT_LOG_FORMAT value")?;
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
