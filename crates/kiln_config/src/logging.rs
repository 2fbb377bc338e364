//! Installation of the process-wide `tracing` subscriber.

use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::types::LogConfig;

/// Parses an `EnvFilter` directive string.
pub fn parse_filter(directives: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(directives).map_err(|e| ConfigError::LoggingError(e.to_string()))
}

/// Installs a formatting subscriber for the configured filter.
///
/// A non-empty `RUST_LOG` environment variable takes precedence over
/// `config.filter`. Fails if a global subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), ConfigError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => parse_filter(&env)?,
        _ => parse_filter(&config.filter)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_level(true)
        .try_init()
        .map_err(|e| ConfigError::LoggingError(e.to_string()))
}
