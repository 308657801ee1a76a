//! Structured logging setup

use crate::error::DirectoryError;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Check that `level` parses as a filter directive
    pub fn validate(&self) -> Result<(), DirectoryError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| DirectoryError::config(format!("invalid log level {:?}: {e}", self.level)))
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DirectoryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| DirectoryError::config(format!("invalid log level: {e}")))?,
    };

    let fmt_layer = if config.json_format {
        fmt::layer().json().with_current_span(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| DirectoryError::config(format!("logging already initialized: {e}")))?;

    info!(
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );
    Ok(())
}
