//! # Ports
//!
//! The supervisor only needs start/stop, a status read and the failure
//! subscription, so anything shaped like a worker can be supervised.

use crate::error::SupervisorError;
use async_trait::async_trait;
use shared_types::WorkerStatus;
use std::sync::Arc;
use tr_02_submission_worker::{FailureSubscription, TxSubmitWorker, WorkerError};

/// A worker the supervisor can run.
#[async_trait]
pub trait SupervisedWorker: Send + Sync {
    /// Start consuming.
    async fn start(&self) -> Result<(), WorkerError>;

    /// Stop and release broker resources. Must be idempotent.
    async fn stop(&self);

    /// Current status.
    fn status(&self) -> WorkerStatus;

    /// Subscribe to the single connection-failure notification.
    fn subscribe_failures(&self) -> FailureSubscription;
}

#[async_trait]
impl SupervisedWorker for TxSubmitWorker {
    async fn start(&self) -> Result<(), WorkerError> {
        TxSubmitWorker::start(self).await
    }

    async fn stop(&self) {
        TxSubmitWorker::stop(self).await;
    }

    fn status(&self) -> WorkerStatus {
        TxSubmitWorker::status(self)
    }

    fn subscribe_failures(&self) -> FailureSubscription {
        TxSubmitWorker::subscribe_failures(self)
    }
}

/// Builds fresh, unstarted workers.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    /// Build a new worker, resolving whatever it needs.
    async fn create(&self) -> Result<Arc<dyn SupervisedWorker>, SupervisorError>;
}
