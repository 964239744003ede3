//! Deliveries, consumer streams and close signals.

use crate::error::BrokerError;
use tokio::sync::{mpsc, watch};

/// A message handed to this channel by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to ack or nack the message.
    pub delivery_tag: u64,
    /// Message body.
    pub payload: Vec<u8>,
    /// Whether the message was delivered before and requeued.
    pub redelivered: bool,
    /// Queue the message came from.
    pub queue: String,
}

/// Push-mode deliveries for one consumer.
///
/// The stream ends when the consumer is cancelled or its channel closes.
#[derive(Debug)]
pub struct DeliveryStream {
    consumer_tag: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl DeliveryStream {
    /// Wrap a receiver fed by a broker adapter.
    pub fn new(consumer_tag: impl Into<String>, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            rx,
        }
    }

    /// Tag to pass to `BrokerChannel::cancel`.
    #[must_use]
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Next delivery, or `None` once the consumer is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Sending half of a close signal, owned by the connection or channel.
///
/// Dropping the notifier without calling [`CloseNotifier::notify`] marks a
/// graceful close.
#[derive(Debug)]
pub struct CloseNotifier {
    tx: watch::Sender<Option<BrokerError>>,
}

impl CloseNotifier {
    /// Create a notifier for an open connection or channel.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Record an abnormal close. Only the first error is kept.
    pub fn notify(&self, error: BrokerError) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(error);
                true
            } else {
                false
            }
        });
    }

    /// A new receiving half.
    #[must_use]
    pub fn subscribe(&self) -> CloseSignal {
        CloseSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CloseNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when the owning connection or channel closes.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<Option<BrokerError>>,
}

impl CloseSignal {
    /// Wait for the close.
    ///
    /// Returns `Some(error)` for an abnormal close, `None` for a graceful one.
    pub async fn closed(&mut self) -> Option<BrokerError> {
        loop {
            if let Some(error) = self.rx.borrow_and_update().clone() {
                return Some(error);
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }

    /// The close error, if one has been recorded.
    #[must_use]
    pub fn error(&self) -> Option<BrokerError> {
        self.rx.borrow().clone()
    }
}
