// Configuration validation
//
// Validates that values are present and sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_dedup_config(&config.dedup, &config.flush)?;
    validate_flush_config(&config.flush)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_dedup_config(config: &DedupConfig, flush: &FlushConfig) -> Result<()> {
    if let Some(window_secs) = config.window_secs {
        if window_secs == 0 {
            bail!("dedup.window_secs must be greater than 0 (omit it to dedup until the next flush)");
        }

        if window_secs < flush.interval_secs {
            warn!(
                window_secs,
                interval_secs = flush.interval_secs,
                "dedup.window_secs is shorter than flush.interval_secs; pending membership will dominate"
            );
        }
    }

    Ok(())
}

fn validate_flush_config(config: &FlushConfig) -> Result<()> {
    if config.interval_secs == 0 {
        bail!("flush.interval_secs must be greater than 0");
    }

    if config.item_timeout_ms == 0 {
        bail!("flush.item_timeout_ms must be greater than 0");
    }

    if config.escalate_after_cycles == 0 {
        bail!("flush.escalate_after_cycles must be greater than 0");
    }

    if config.item_timeout_ms >= config.interval_secs.saturating_mul(1_000) {
        warn!(
            item_timeout_ms = config.item_timeout_ms,
            interval_secs = config.interval_secs,
            "flush.item_timeout_ms is not shorter than the flush interval; cycles may overlap"
        );
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    if config.log_level.trim().is_empty() {
        bail!("logging.log_level must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_flush_config() {
        assert!(validate_flush_config(&FlushConfig::default()).is_ok());

        let zero_interval = FlushConfig {
            interval_secs: 0,
            ..FlushConfig::default()
        };
        assert!(validate_flush_config(&zero_interval).is_err());

        let zero_timeout = FlushConfig {
            item_timeout_ms: 0,
            ..FlushConfig::default()
        };
        assert!(validate_flush_config(&zero_timeout).is_err());

        let zero_escalation = FlushConfig {
            escalate_after_cycles: 0,
            ..FlushConfig::default()
        };
        assert!(validate_flush_config(&zero_escalation).is_err());
    }

    #[test]
    fn test_validate_dedup_config() {
        let flush = FlushConfig::default();
        assert!(validate_dedup_config(&DedupConfig::default(), &flush).is_ok());
        assert!(validate_dedup_config(
            &DedupConfig {
                window_secs: Some(3600)
            },
            &flush
        )
        .is_ok());
        assert!(validate_dedup_config(
            &DedupConfig {
                window_secs: Some(0)
            },
            &flush
        )
        .is_err());
    }

    #[test]
    fn test_validate_logging_config() {
        let empty = LoggingConfig {
            log_level: "  ".to_string(),
            ..LoggingConfig::default()
        };
        assert!(validate_logging_config(&empty).is_err());
    }
}
