//! Supervisor errors.

use shared_types::WorkerStatus;
use thiserror::Error;
use tr_02_submission_worker::WorkerError;

/// Errors building or starting a supervised worker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SupervisorError {
    /// The factory could not build a worker (usually discovery).
    #[error("Worker factory failed: {0}")]
    Factory(String),

    /// The worker refused to start.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// `start` returned but the worker never reached `Connected`.
    #[error("Worker did not connect (status {0})")]
    NotConnected(WorkerStatus),
}

impl SupervisorError {
    /// Wrap a factory error.
    pub fn factory(error: impl std::fmt::Display) -> Self {
        Self::Factory(error.to_string())
    }
}
