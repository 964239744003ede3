//! # Per-Message Handling
//!
//! Identify, submit, acknowledge, reply. Every broker call is guarded on its
//! own: a failed ack or reply is logged and counted, and handling moves on.

use relay_telemetry::metric_inc;
use relay_telemetry::metrics::{
    OUTCOME_ACKED, OUTCOME_MALFORMED, OUTCOME_REJECTED, OUTCOME_REQUEUED,
    WORKER_MESSAGES_RECEIVED, WORKER_MESSAGE_OUTCOMES, WORKER_REPLIES_PUBLISHED,
    WORKER_REPLY_FAILURES,
};
use shared_bus::{BrokerChannel, BrokerError, Delivery};
use shared_types::{
    RetryClassification, SubmissionOutcome, TransactionId, TxIdentifier, TxSubmitProvider,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Submitted; acked and a success reply was sent.
    Submitted(TransactionId),
    /// Retryable failure; nacked for redelivery.
    Requeued(TransactionId),
    /// Fatal failure; acked and the failure was sent as the reply.
    Rejected(TransactionId),
    /// Payload could not be identified; acked without a reply.
    Malformed,
}

/// Handles deliveries from the submission queue.
///
/// Shared by every handler task of a worker; holds only read-only
/// collaborators and the sequence counter.
pub struct MessageHandler {
    provider: Arc<dyn TxSubmitProvider>,
    identifier: Arc<dyn TxIdentifier>,
    sequence: AtomicU64,
}

impl MessageHandler {
    /// Create a handler.
    pub fn new(provider: Arc<dyn TxSubmitProvider>, identifier: Arc<dyn TxIdentifier>) -> Self {
        Self {
            provider,
            identifier,
            sequence: AtomicU64::new(0),
        }
    }

    /// Messages taken so far.
    #[must_use]
    pub fn handled(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Process one delivery to completion.
    pub async fn handle(&self, channel: &dyn BrokerChannel, delivery: Delivery) -> HandleOutcome {
        let counter = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        metric_inc!(WORKER_MESSAGES_RECEIVED);

        let tx_id = match self.identifier.transaction_id(&delivery.payload) {
            Ok(tx_id) => tx_id,
            Err(error) => {
                warn!(counter, error = %error, "Malformed submission, dropping");
                metric_inc!(WORKER_MESSAGE_OUTCOMES, &[OUTCOME_MALFORMED]);
                ack(channel, counter, delivery.delivery_tag).await;
                return HandleOutcome::Malformed;
            }
        };

        debug!(
            counter,
            tx_id = %tx_id,
            redelivered = delivery.redelivered,
            "Submitting transaction"
        );

        match self.provider.submit_tx(&delivery.payload).await {
            Ok(()) => {
                info!(counter, tx_id = %tx_id, "Transaction submitted");
                ack(channel, counter, delivery.delivery_tag).await;
                reply(channel, counter, &tx_id, &SubmissionOutcome::Success).await;
                HandleOutcome::Submitted(tx_id)
            }
            Err(failure) => match failure.classify() {
                RetryClassification::Retryable => {
                    warn!(counter, tx_id = %tx_id, error = %failure, "Retryable failure, requeueing");
                    match channel.nack(delivery.delivery_tag, true).await {
                        Ok(()) => metric_inc!(WORKER_MESSAGE_OUTCOMES, &[OUTCOME_REQUEUED]),
                        Err(error) => {
                            warn!(counter, tx_id = %tx_id, error = %error, "Failed to nack message");
                            metric_inc!(WORKER_MESSAGE_OUTCOMES, &[OUTCOME_REJECTED]);
                        }
                    }
                    HandleOutcome::Requeued(tx_id)
                }
                RetryClassification::Fatal => {
                    warn!(counter, tx_id = %tx_id, error = %failure, "Transaction rejected");
                    ack(channel, counter, delivery.delivery_tag).await;
                    reply(channel, counter, &tx_id, &SubmissionOutcome::Failure(failure)).await;
                    HandleOutcome::Rejected(tx_id)
                }
            },
        }
    }
}

async fn ack(channel: &dyn BrokerChannel, counter: u64, delivery_tag: u64) {
    match channel.ack(delivery_tag).await {
        Ok(()) => metric_inc!(WORKER_MESSAGE_OUTCOMES, &[OUTCOME_ACKED]),
        Err(error) => {
            warn!(counter, delivery_tag, error = %error, "Failed to ack message");
            metric_inc!(WORKER_MESSAGE_OUTCOMES, &[OUTCOME_REJECTED]);
        }
    }
}

async fn reply(
    channel: &dyn BrokerChannel,
    counter: u64,
    tx_id: &TransactionId,
    outcome: &SubmissionOutcome,
) {
    let queue = tx_id.to_hex();
    match publish_reply(channel, &queue, &outcome.encode()).await {
        Ok(()) => {
            metric_inc!(WORKER_REPLIES_PUBLISHED);
            debug!(counter, queue = %queue, success = outcome.is_success(), "Reply published");
        }
        Err(error) => {
            metric_inc!(WORKER_REPLY_FAILURES);
            warn!(counter, queue = %queue, error = %error, "Failed to publish reply");
        }
    }
}

async fn publish_reply(
    channel: &dyn BrokerChannel,
    queue: &str,
    payload: &[u8],
) -> Result<(), BrokerError> {
    channel.declare_queue(queue).await?;
    channel.publish(queue, payload).await
}
