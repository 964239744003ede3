//! Worker errors.

use shared_bus::BrokerError;
use thiserror::Error;

/// Errors surfaced by `TxSubmitWorker::start`.
///
/// Broker setup failures are not returned here; they go through the
/// connection-failure subscription like any later connection loss.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The upstream provider failed its health check.
    #[error("Upstream provider is unhealthy")]
    Unhealthy,

    /// `start` was called on a worker that already has a session.
    #[error("Worker is already running")]
    AlreadyRunning,

    /// Broker failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
