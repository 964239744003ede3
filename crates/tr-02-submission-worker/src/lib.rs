//! # Submission Worker
//!
//! Drains the durable `cardano-tx-submit` queue into a `TxSubmitProvider`
//! and answers each transaction on a reply queue named by its id.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──start()──→ Connecting ──setup ok──→ Connected
//!                        │                       │
//!                        └──── close / error ────┴──→ Error ──stop done──→ Idle
//! ```
//!
//! ## Message Outcomes
//!
//! | Upstream result | Broker action | Reply |
//! |-----------------|---------------|-------|
//! | success | ack | empty payload |
//! | retryable failure | nack + requeue | none |
//! | fatal failure | ack | JSON failure |
//! | malformed payload | ack | none |
//!
//! ## Consumption Modes
//!
//! - **Serial** (default): one `get` at a time, sleeping `polling_cycle`
//!   whenever the queue is empty.
//! - **Parallel**: a push consumer with channel-wide prefetch
//!   `parallel_txs`; each delivery is handled on its own task.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod worker;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use events::{FailureSlot, FailureSubscription};
pub use handler::{HandleOutcome, MessageHandler};
pub use worker::TxSubmitWorker;
