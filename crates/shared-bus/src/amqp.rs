//! # AMQP Adapter
//!
//! Implements the broker ports over lapin (AMQP 0-9-1).
//!
//! - Queues are declared durable.
//! - Prefetch is applied with `global = true`, i.e. shared by every consumer
//!   on the channel.
//! - Publishes go through the default exchange and wait for the broker's
//!   confirmation frame before returning.

use crate::delivery::{CloseNotifier, CloseSignal, Delivery, DeliveryStream};
use crate::error::BrokerError;
use crate::ports::{BrokerChannel, BrokerConnection, BrokerConnector};
use crate::url::BrokerUrl;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicGetOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const REPLY_SUCCESS: u16 = 200;

fn map_error(error: lapin::Error) -> BrokerError {
    match error {
        lapin::Error::InvalidChannelState(state) => {
            BrokerError::ChannelClosed(format!("channel state {state:?}"))
        }
        lapin::Error::InvalidConnectionState(state) => {
            BrokerError::ConnectionClosed(format!("connection state {state:?}"))
        }
        lapin::Error::IOError(io) => BrokerError::ConnectionClosed(io.to_string()),
        other => BrokerError::Protocol(other.to_string()),
    }
}

/// Shared slot for a close notifier. Taking it marks a graceful close.
type NotifierSlot = Arc<Mutex<Option<CloseNotifier>>>;

fn notifier_slot() -> (NotifierSlot, CloseSignal) {
    let notifier = CloseNotifier::new();
    let signal = notifier.subscribe();
    (Arc::new(Mutex::new(Some(notifier))), signal)
}

/// Connects to RabbitMQ (or any AMQP 0-9-1 broker) through lapin.
#[derive(Debug, Clone, Default)]
pub struct AmqpConnector {
    connection_name: Option<String>,
}

impl AmqpConnector {
    /// Connector with default connection properties.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name shown for the connection in the broker's management UI.
    #[must_use]
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, url: &BrokerUrl) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let mut properties = ConnectionProperties::default();
        if let Some(name) = &self.connection_name {
            properties = properties.with_connection_name(name.clone().into());
        }

        let connection = Connection::connect(url.as_str(), properties)
            .await
            .map_err(|e| BrokerError::Connection(format!("{}: {e}", url.redacted())))?;

        let (slot, signal) = notifier_slot();
        let handler_slot = Arc::clone(&slot);
        connection.on_error(move |error| {
            warn!(error = %error, "AMQP connection error");
            if let Some(notifier) = handler_slot.lock().as_ref() {
                notifier.notify(BrokerError::ConnectionClosed(error.to_string()));
            }
        });
        debug!(url = %url, "AMQP connection opened");

        Ok(Arc::new(AmqpConnection {
            connection,
            slot,
            signal,
        }))
    }
}

struct AmqpConnection {
    connection: Connection,
    slot: NotifierSlot,
    signal: CloseSignal,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let channel = self.connection.create_channel().await.map_err(map_error)?;

        let (slot, signal) = notifier_slot();
        let handler_slot = Arc::clone(&slot);
        channel.on_error(move |error| {
            warn!(error = %error, "AMQP channel error");
            if let Some(notifier) = handler_slot.lock().as_ref() {
                notifier.notify(BrokerError::ChannelClosed(error.to_string()));
            }
        });

        Ok(Arc::new(AmqpChannel {
            channel,
            slot,
            signal,
        }))
    }

    fn close_signal(&self) -> CloseSignal {
        self.signal.clone()
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.slot.lock().take();
        if !self.is_open() {
            return Ok(());
        }
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(map_error)
    }
}

struct AmqpChannel {
    channel: Channel,
    slot: NotifierSlot,
    signal: CloseSignal,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions { global: true })
            .await
            .map_err(map_error)
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(map_error)?;
        let consumer_tag = consumer.tag().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let queue_name = queue.to_string();
        let channel = self.channel.clone();
        let tag = consumer_tag.clone();

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    () = tx.closed() => break,
                    item = consumer.next() => item,
                };
                match item {
                    Some(Ok(delivery)) => {
                        let delivery_tag = delivery.delivery_tag;
                        let forwarded = Delivery {
                            delivery_tag,
                            payload: delivery.data,
                            redelivered: delivery.redelivered,
                            queue: queue_name.clone(),
                        };
                        if tx.send(forwarded).is_err() {
                            let requeue = BasicNackOptions {
                                requeue: true,
                                ..BasicNackOptions::default()
                            };
                            if let Err(error) = channel.basic_nack(delivery_tag, requeue).await {
                                debug!(queue = %queue_name, error = %error, "Failed to requeue undelivered message");
                            }
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        debug!(queue = %queue_name, error = %error, "AMQP consumer ended");
                        return;
                    }
                    None => return,
                }
            }
            // The stream was dropped; stop the broker pushing to a dead consumer.
            if let Err(error) = channel
                .basic_cancel(&tag, BasicCancelOptions::default())
                .await
            {
                debug!(queue = %queue_name, error = %error, "Failed to cancel abandoned consumer");
            }
        });

        Ok(DeliveryStream::new(consumer_tag, rx))
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(map_error)
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions::default())
            .await
            .map_err(map_error)?;
        Ok(message.map(|message| Delivery {
            delivery_tag: message.delivery.delivery_tag,
            payload: message.delivery.data,
            redelivered: message.delivery.redelivered,
            queue: queue.to_string(),
        }))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(map_error)
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    multiple: false,
                },
            )
            .await
            .map_err(map_error)
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(map_error)?
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    fn close_signal(&self) -> CloseSignal {
        self.signal.clone()
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.slot.lock().take();
        if !self.is_open() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(map_error)
    }
}
