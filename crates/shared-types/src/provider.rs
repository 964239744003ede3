//! Upstream provider ports.
//!
//! `TxSubmitProvider` is the contract of the upstream submission endpoint.
//! The worker depends on it, and the correlated broker client implements it,
//! so callers never need to know whether a broker sits in between.

use async_trait::async_trait;

use crate::entities::{HealthCheckResponse, SignedTransaction, TransactionId};
use crate::errors::{MalformedTransaction, SubmissionFailure};

/// Submits signed transactions to a node.
///
/// Implementations must tolerate concurrent calls (up to the worker's
/// prefetch count in parallel mode).
#[async_trait]
pub trait TxSubmitProvider: Send + Sync {
    /// Report whether the provider can currently accept submissions.
    async fn health_check(&self) -> HealthCheckResponse;

    /// Submit one serialized signed transaction.
    async fn submit_tx(&self, signed_transaction: &[u8]) -> Result<(), SubmissionFailure>;
}

/// Derives the `TransactionId` of a serialized signed transaction.
///
/// The worker and the correlated client must use the same identifier so that
/// replies land on the queue the client listens to.
pub trait TxIdentifier: Send + Sync {
    /// Decode just enough of `raw` to identify it.
    fn transaction_id(&self, raw: &[u8]) -> Result<TransactionId, MalformedTransaction>;
}

/// Identifier for bincode-encoded `SignedTransaction` envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeTxIdentifier;

impl TxIdentifier for BincodeTxIdentifier {
    fn transaction_id(&self, raw: &[u8]) -> Result<TransactionId, MalformedTransaction> {
        SignedTransaction::from_bytes(raw).map(|tx| tx.id())
    }
}
