//! Broker ports.
//!
//! Every adapter (in-memory, lapin) implements these three traits. Queues are
//! always declared durable and messages are routed through the default
//! exchange, so a queue name is also its routing key.

use crate::delivery::{CloseSignal, Delivery, DeliveryStream};
use crate::error::BrokerError;
use crate::url::BrokerUrl;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens connections to a broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connect to the broker at `url`.
    async fn connect(&self, url: &BrokerUrl) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a new channel on this connection.
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    /// Resolves when the connection closes.
    fn close_signal(&self) -> CloseSignal;

    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;

    /// Close the connection and all of its channels.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A channel multiplexed over a connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a durable queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Delete a queue and any messages in it.
    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Limit unacknowledged pushed deliveries on this channel. `0` is unlimited.
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    /// Start a push-mode consumer on `queue`.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;

    /// Stop a consumer started with [`BrokerChannel::consume`].
    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError>;

    /// Pull a single message, if one is ready.
    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge a delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Negatively acknowledge a delivery, optionally returning it to its queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;

    /// Publish `payload` to `queue` through the default exchange.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Resolves when the channel closes.
    fn close_signal(&self) -> CloseSignal;

    /// Whether the channel is still usable.
    fn is_open(&self) -> bool;

    /// Close the channel. Unacknowledged deliveries are requeued.
    async fn close(&self) -> Result<(), BrokerError>;
}
