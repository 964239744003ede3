//! Log subscriber setup.
//!
//! Human readable output by default; JSON (one object per line) when
//! `json_logs` is set so a log shipper can parse fields like `tx_id` and
//! `queue` directly.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level {:?}: {e}", config.log_level)))
}

/// Install the global `tracing` subscriber.
///
/// Fails if the filter directive is invalid or a global subscriber is
/// already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let result = if config.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
