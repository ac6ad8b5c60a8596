//! Tracing subscriber setup driven by [`LoggingConfig`].

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::TripWeaverError;

/// Installs the global tracing subscriber.
///
/// The `RUST_LOG` environment variable overrides the configured level.
/// Returns an error if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), TripWeaverError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.pretty().try_init()
    };

    result.map_err(|e| TripWeaverError::config(format!("failed to install tracing subscriber: {e}")))
}
