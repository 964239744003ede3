//! # Correlated Submit Client
//!
//! Producer side of the relay. Implements `TxSubmitProvider` by publishing
//! the transaction to the submission queue and waiting for the worker's reply
//! on a queue named after the transaction id.
//!
//! ## Round Trip
//!
//! ```text
//! submit_tx(raw)
//!   ├─ tx_id = identifier(raw)          (malformed → rejected locally)
//!   ├─ declare + consume  <tx_id hex>
//!   ├─ publish raw → cardano-tx-submit
//!   ├─ await one reply, ack it
//!   └─ cancel consumer, delete <tx_id hex> (best effort)
//! ```
//!
//! There is no timeout at this layer; wrap calls in `tokio::time::timeout`.
//!
//! `DiscoveringTxSubmitProvider` adds SRV discovery in front of any provider
//! and rebuilds it once after a connection failure.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod discovering;
pub mod error;

pub use client::{BrokerProviderFactory, BrokerTxSubmitProvider};
pub use discovering::{DiscoveringTxSubmitProvider, ProviderFactory};
pub use error::SubmitClientError;
