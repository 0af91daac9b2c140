//! Tracing subscriber initialisation.
//!
//! The log level is usually derived from the CLI verbosity count; `RUST_LOG`
//! takes precedence when set.

use crate::PlatformError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to every event
    pub service_name: String,
    /// Log level filter
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "vaultify".to_string(),
            log_level: "error".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Create config with the level matching a `-v` count.
    #[must_use]
    pub fn with_verbosity(self, verbosity: u8) -> Self {
        self.with_log_level(level_for_verbosity(verbosity))
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Map a repeated `-v` flag count to a level filter.
///
/// 0 → error, 1 → warn, 2 → info, 3 → debug, anything above → trace.
#[must_use]
pub const fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize tracing with the given configuration.
///
/// Should be called once at application startup.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), PlatformError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| PlatformError::internal(format!("tracing init: {e}")))?;
    tracing::debug!(service = %config.service_name, level = %config.log_level, "Tracing initialized");
    Ok(())
}
