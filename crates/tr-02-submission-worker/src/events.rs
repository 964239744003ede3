//! Connection-failure notification.
//!
//! Each worker holds a single subscription slot. Subscribing again replaces
//! the previous subscriber; the notification is sent at most once per worker.

use parking_lot::Mutex;
use shared_bus::BrokerError;
use tokio::sync::oneshot;

/// Receiving side of the connection-failure notification.
#[derive(Debug)]
pub struct FailureSubscription {
    rx: oneshot::Receiver<BrokerError>,
}

impl FailureSubscription {
    /// Wait for the worker's connection to fail.
    ///
    /// Returns `None` if the subscription was replaced or the worker was
    /// dropped without failing.
    pub async fn recv(self) -> Option<BrokerError> {
        self.rx.await.ok()
    }
}

/// Sending side: one subscriber at a time, one notification in total.
#[derive(Debug, Default)]
pub struct FailureSlot {
    sender: Mutex<Option<oneshot::Sender<BrokerError>>>,
}

impl FailureSlot {
    /// Replace the current subscriber.
    pub fn subscribe(&self) -> FailureSubscription {
        let (tx, rx) = oneshot::channel();
        *self.sender.lock() = Some(tx);
        FailureSubscription { rx }
    }

    /// Deliver `error` to the current subscriber, if any. Returns whether it was delivered.
    pub fn emit(&self, error: BrokerError) -> bool {
        match self.sender.lock().take() {
            Some(tx) => tx.send(error).is_ok(),
            None => false,
        }
    }
}
