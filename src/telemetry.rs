//! Structured logging init for consumers/tests.
//!
//! The library itself never installs a global subscriber — it only emits
//! `tracing` events. This module is a convenience for binaries and tests
//! that embed the crate, mirroring the teacher's `telemetry::logging`
//! module but trimmed to a single format (the teacher's JSON/pretty/OTLP
//! split has no remaining use without a service boundary).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter applied when `RUST_LOG` is unset, e.g. `"ldcache=debug,info"`.
    pub default_filter: String,
    /// Pretty (human-readable) output instead of compact single-line.
    pub pretty: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "ldcache=info,warn".to_string(),
            pretty: false,
        }
    }
}

/// Install a global `tracing` subscriber. Idempotent: a second call is a
/// harmless no-op if a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    if config.pretty {
        let _ = registry.with(fmt::layer().pretty()).try_init();
    } else {
        let _ = registry.with(fmt::layer().compact()).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_to_crate() {
        let cfg = LoggingConfig::default();
        assert!(cfg.default_filter.contains("ldcache"));
    }
}
