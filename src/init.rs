// Initialization utilities
//
// Logging/tracing setup and flush options derived from RuntimeConfig

use viewcount_config::{FlushConfig, LogFormat, RuntimeConfig};
use viewcount_tracker::FlushOptions;

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.logging.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

pub(crate) fn flush_options(config: &FlushConfig) -> FlushOptions {
    FlushOptions {
        item_timeout: config.item_timeout(),
        record_views: config.record_views,
        escalate_after_cycles: config.escalate_after_cycles,
    }
}
