//! # Relay Runtime
//!
//! Configuration loading and component wiring for Tx-Relay processes.
//!
//! ## Startup Sequence
//!
//! 1. `bootstrap("worker")`: telemetry, then `RelayConfig::from_env` and `validate`
//! 2. Pick backends (`RelayBackends::system` with features `amqp` + `dns`)
//! 3. Worker side: `load_and_start_tx_worker` (supervised) or
//!    `get_running_tx_submit_worker` (single instance)
//! 4. Client side: `get_broker_tx_submit_provider`
//! 5. `spawn_metrics_endpoint` to expose `GET /metrics` on `TR_METRICS_PORT`

pub mod config;
pub mod wiring;

pub use config::{ConfigError, RelayConfig};
pub use wiring::{
    broker_url, get_broker_tx_submit_provider, get_running_tx_submit_worker,
    load_and_start_tx_worker, load_tx_worker, RelayBackends,
};

use anyhow::{Context, Result};
use relay_telemetry::{init_telemetry, serve_metrics, TelemetryConfig, TelemetryGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Initialize telemetry for `process` and load the validated configuration.
///
/// Keep the guard alive for the lifetime of the process.
pub fn bootstrap(process: &str) -> Result<(RelayConfig, TelemetryGuard)> {
    let guard = init_telemetry(&TelemetryConfig::for_process(process))
        .context("Failed to initialize telemetry")?;
    let config = RelayConfig::from_env().context("Failed to load relay configuration")?;
    config.validate().context("Invalid relay configuration")?;
    info!(
        srv = config.srv_name().unwrap_or("-"),
        parallel = config.parallel,
        parallel_txs = config.parallel_txs,
        "Relay configuration loaded"
    );
    Ok((config, guard))
}

/// Serve `/metrics` on the guard's port until `shutdown` becomes `true`.
pub fn spawn_metrics_endpoint(
    guard: &TelemetryGuard,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let port = guard.metrics_port();
    tokio::spawn(async move {
        let stopped = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        };
        if let Err(err) = serve_metrics(port, stopped).await {
            error!(port, error = %err, "Metrics endpoint stopped");
        }
    })
}
