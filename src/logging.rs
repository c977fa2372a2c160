use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogConfig, LogFormat};

static INIT: Once = Once::new();

pub fn filter_directive(level: &str) -> String {
    format!("computed_where_transformer={}", level)
}

// RUST_LOG wins over the configured level. Later calls are no-ops.
pub fn init(config: &LogConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(filter_directive(&config.level)))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        let registry = tracing_subscriber::registry().with(filter);
        let installed = match config.format {
            LogFormat::Full => registry.with(fmt::layer()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };
        if installed.is_ok() {
            tracing::info!(level = %config.level, format = ?config.format, "Logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("debug"), "computed_where_transformer=debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default();
        init(&config);
        init(&config);
    }
}
