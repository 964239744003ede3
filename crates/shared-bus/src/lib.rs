//! # Shared Bus - Broker Port for Transaction Submission
//!
//! Abstracts the AMQP 0-9-1 primitives the submission worker and the
//! correlated client rely on.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────┐  connect()   ┌──────────────────┐  create_channel()  ┌──────────────────┐
//! │ BrokerConnector  │ ───────────→ │ BrokerConnection │ ─────────────────→ │  BrokerChannel   │
//! └──────────────────┘              └──────────────────┘                    └──────────────────┘
//!                                          │ close_signal()                        │ declare / consume / get
//!                                          ↓                                       │ ack / nack / publish
//!                                    CloseSignal                                   ↓
//!                                                                           DeliveryStream
//! ```
//!
//! ## Semantics
//!
//! - **Default exchange routing:** publishing to a queue name delivers to that
//!   queue; publishing to an undeclared queue silently drops the message.
//! - **Prefetch:** a channel-wide limit on unacknowledged pushed deliveries.
//! - **Requeue:** nacked (and unacked-at-close) messages return to the head of
//!   their queue flagged as redelivered.
//! - **Close signals:** resolve to `Some(error)` on an abnormal close and to
//!   `None` after a graceful `close()`.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod delivery;
pub mod error;
pub mod memory;
pub mod ports;
pub mod url;

#[cfg(feature = "amqp")]
pub mod amqp;

// Re-export main types
pub use delivery::{CloseNotifier, CloseSignal, Delivery, DeliveryStream};
pub use error::BrokerError;
pub use memory::InMemoryBroker;
pub use ports::{BrokerChannel, BrokerConnection, BrokerConnector};
pub use url::BrokerUrl;

#[cfg(feature = "amqp")]
pub use amqp::AmqpConnector;

/// Default AMQP port.
pub const DEFAULT_AMQP_PORT: u16 = 5672;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(DEFAULT_AMQP_PORT, 5672);
    }
}
