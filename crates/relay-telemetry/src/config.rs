//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// `EnvFilter` directive (e.g. `info`, `tr_02_submission_worker=debug`)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Port `serve_metrics` binds for the Prometheus endpoint
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tx-relay".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: 9100,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TR_SERVICE_NAME`: Service name (default: tx-relay)
    /// - `TR_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `TR_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `TR_METRICS_PORT`: Prometheus metrics port (default: 9100)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        Self {
            service_name: env::var("TR_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("TR_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: env::var("TR_JSON_LOGS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(is_container),

            metrics_port: env::var("TR_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }

    /// Configuration for a named relay process, e.g. `worker`.
    pub fn for_process(process: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("tx-relay-{process}");
        config
    }
}
