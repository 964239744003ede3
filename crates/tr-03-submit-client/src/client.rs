//! # Broker Submit Client
//!
//! `BrokerTxSubmitProvider` publishes onto the submission queue and awaits
//! the correlated reply. Concurrent calls are safe as long as they carry
//! distinct transactions; two in-flight calls for the same transaction id
//! would share a reply queue.
//!
//! A call dropped while waiting (for example by a caller's timeout) still
//! cancels its reply consumer and deletes the reply queue in the
//! background. A later call for the same transaction waits for that cleanup
//! before declaring the queue again.

use crate::discovering::ProviderFactory;
use crate::error::SubmitClientError;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{
    BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, BrokerUrl, Delivery,
    DeliveryStream,
};
use shared_types::{
    HealthCheckResponse, ServiceLocation, SubmissionFailure, SubmissionOutcome, TxIdentifier,
    TxSubmitProvider, TX_SUBMISSION_QUEUE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background cleanups of abandoned reply queues, by queue name.
type PendingReleases = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Relays submissions to a remote worker through the broker.
///
/// Dropping a client that opened its own connection closes that connection
/// in the background.
pub struct BrokerTxSubmitProvider {
    connection: Option<Arc<dyn BrokerConnection>>,
    channel: Arc<dyn BrokerChannel>,
    identifier: Arc<dyn TxIdentifier>,
    abandoned: PendingReleases,
}

impl BrokerTxSubmitProvider {
    /// Connect to the broker at `url` and open a channel.
    pub async fn connect(
        connector: &dyn BrokerConnector,
        url: &BrokerUrl,
        identifier: Arc<dyn TxIdentifier>,
    ) -> Result<Self, SubmitClientError> {
        let connection = connector.connect(url).await?;
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(error) => {
                let _ = connection.close().await;
                return Err(error.into());
            }
        };
        info!(broker = %url, "Submit client connected");
        Ok(Self {
            connection: Some(connection),
            channel,
            identifier,
            abandoned: PendingReleases::default(),
        })
    }

    /// Use an existing channel. The caller keeps ownership of its connection.
    pub fn from_channel(channel: Arc<dyn BrokerChannel>, identifier: Arc<dyn TxIdentifier>) -> Self {
        Self {
            connection: None,
            channel,
            identifier,
            abandoned: PendingReleases::default(),
        }
    }

    /// Close the channel, and the connection if this client opened it.
    pub async fn close(&self) {
        if let Err(error) = self.channel.close().await {
            warn!(error = %error, "Failed to close submit client channel");
        }
        if let Some(connection) = &self.connection {
            if let Err(error) = connection.close().await {
                warn!(error = %error, "Failed to close submit client connection");
            }
        }
    }

    async fn round_trip(&self, reply_queue: &str, raw: &[u8]) -> Result<SubmissionOutcome, BrokerError> {
        let pending = self.abandoned.lock().remove(reply_queue);
        if let Some(pending) = pending {
            debug!(queue = reply_queue, "Waiting for abandoned reply queue cleanup");
            let _ = pending.await;
        }

        let mut replies = ReplyConsumer::open(
            Arc::clone(&self.channel),
            reply_queue,
            Arc::clone(&self.abandoned),
        )
        .await?;

        let published = match self.channel.declare_queue(TX_SUBMISSION_QUEUE).await {
            Ok(()) => self.channel.publish(TX_SUBMISSION_QUEUE, raw).await,
            Err(error) => Err(error),
        };
        if let Err(error) = published {
            replies.release().await;
            return Err(error);
        }
        debug!(queue = reply_queue, "Submission published, awaiting reply");

        let Some(reply) = replies.next().await else {
            replies.release().await;
            return Err(BrokerError::ChannelClosed(format!(
                "reply consumer on {reply_queue} ended"
            )));
        };

        if let Err(error) = self.channel.ack(reply.delivery_tag).await {
            warn!(queue = reply_queue, error = %error, "Failed to ack reply");
        }
        replies.release().await;

        Ok(SubmissionOutcome::decode(&reply.payload))
    }
}

impl Drop for BrokerTxSubmitProvider {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if !connection.is_open() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime left to close submit client connection");
            return;
        };
        debug!("Submit client dropped, closing its connection");
        runtime.spawn(async move {
            if let Err(error) = connection.close().await {
                debug!(error = %error, "Failed to close dropped submit client connection");
            }
        });
    }
}

/// The consumer on one reply queue.
///
/// `release` cancels it and deletes the queue. If the owning call is dropped
/// first, `Drop` does the same on a background task.
struct ReplyConsumer {
    channel: Arc<dyn BrokerChannel>,
    queue: String,
    stream: DeliveryStream,
    abandoned: PendingReleases,
    released: bool,
}

impl ReplyConsumer {
    async fn open(
        channel: Arc<dyn BrokerChannel>,
        queue: &str,
        abandoned: PendingReleases,
    ) -> Result<Self, BrokerError> {
        channel.declare_queue(queue).await?;
        let stream = channel.consume(queue).await?;
        Ok(Self {
            channel,
            queue: queue.to_string(),
            stream,
            abandoned,
            released: false,
        })
    }

    async fn next(&mut self) -> Option<Delivery> {
        self.stream.next().await
    }

    async fn release(mut self) {
        self.released = true;
        release(self.channel.as_ref(), &self.queue, self.stream.consumer_tag()).await;
    }
}

impl Drop for ReplyConsumer {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(queue = %self.queue, "No runtime left to release abandoned reply queue");
            return;
        };
        debug!(queue = %self.queue, "Reply wait abandoned, releasing in background");
        let channel = Arc::clone(&self.channel);
        let queue = self.queue.clone();
        let consumer_tag = self.stream.consumer_tag().to_string();
        let cleanup = runtime.spawn(async move {
            release(channel.as_ref(), &queue, &consumer_tag).await;
        });
        let mut abandoned = self.abandoned.lock();
        abandoned.retain(|_, pending| !pending.is_finished());
        abandoned.insert(self.queue.clone(), cleanup);
    }
}

async fn release(channel: &dyn BrokerChannel, reply_queue: &str, consumer_tag: &str) {
    if let Err(error) = channel.cancel(consumer_tag).await {
        debug!(queue = reply_queue, error = %error, "Failed to cancel reply consumer");
    }
    if let Err(error) = channel.delete_queue(reply_queue).await {
        debug!(queue = reply_queue, error = %error, "Failed to delete reply queue");
    }
}

#[async_trait]
impl TxSubmitProvider for BrokerTxSubmitProvider {
    async fn health_check(&self) -> HealthCheckResponse {
        HealthCheckResponse {
            ok: self.channel.is_open(),
        }
    }

    async fn submit_tx(&self, signed_transaction: &[u8]) -> Result<(), SubmissionFailure> {
        let tx_id = self.identifier.transaction_id(signed_transaction)?;
        let reply_queue = tx_id.to_hex();

        let outcome = self
            .round_trip(&reply_queue, signed_transaction)
            .await
            .map_err(|error| {
                warn!(tx_id = %tx_id, error = %error, "Submission round trip failed");
                SubmissionFailure::connection(error.to_string())
            })?;

        debug!(tx_id = %tx_id, success = outcome.is_success(), "Reply received");
        outcome.into_result()
    }
}

/// Builds `BrokerTxSubmitProvider`s for discovered broker locations.
pub struct BrokerProviderFactory {
    connector: Arc<dyn BrokerConnector>,
    identifier: Arc<dyn TxIdentifier>,
}

impl BrokerProviderFactory {
    /// Create a factory.
    pub fn new(connector: Arc<dyn BrokerConnector>, identifier: Arc<dyn TxIdentifier>) -> Self {
        Self {
            connector,
            identifier,
        }
    }
}

#[async_trait]
impl ProviderFactory for BrokerProviderFactory {
    async fn build(
        &self,
        location: &ServiceLocation,
    ) -> Result<Arc<dyn TxSubmitProvider>, SubmitClientError> {
        let url = BrokerUrl::from_host_port(&location.host, location.port);
        let provider =
            BrokerTxSubmitProvider::connect(self.connector.as_ref(), &url, Arc::clone(&self.identifier))
                .await?;
        Ok(Arc::new(provider))
    }
}
