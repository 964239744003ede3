//! # Relay Telemetry
//!
//! Structured logging and Prometheus metrics for the Tx-Relay processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//!     // Logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TR_SERVICE_NAME` | `tx-relay` | Service name attached to logs |
//! | `TR_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `TR_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |
//! | `TR_METRICS_PORT` | `9100` | Port `serve_metrics` listens on for `GET /metrics` |

mod config;
mod logging;
pub mod metrics;
mod server;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{gather_metrics, register_metrics, MetricsHandle};
pub use server::{metrics_router, serve_metrics, serve_metrics_on};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Metrics endpoint failed: {0}")]
    MetricsServer(String),
}

/// Install the global subscriber and register all metrics.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        metrics_port = config.metrics_port,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        _metrics: metrics,
        metrics_port: config.metrics_port,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
    metrics_port: u16,
}

impl TelemetryGuard {
    /// Port the metrics endpoint should be served on.
    #[must_use]
    pub fn metrics_port(&self) -> u16 {
        self.metrics_port
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        let before = metrics::WORKER_MESSAGES_RECEIVED.get();
        metric_inc!(metrics::WORKER_MESSAGES_RECEIVED);
        assert!(metrics::WORKER_MESSAGES_RECEIVED.get() >= before + 1.0);

        metric_inc!(metrics::DISCOVERY_LOOKUPS, &[metrics::LOOKUP_RESOLVED]);
        assert!(
            metrics::DISCOVERY_LOOKUPS
                .with_label_values(&[metrics::LOOKUP_RESOLVED])
                .get()
                >= 1.0
        );
    }
}
