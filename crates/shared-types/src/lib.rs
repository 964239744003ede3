//! # Shared Types Crate
//!
//! This crate contains the domain entities, submission outcomes, and the
//! upstream provider ports used by every Tx-Relay component.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Everything that crosses the broker is defined here.
//! - **Worker-Derived Identity**: A `TransactionId` is always recomputed from the
//!   payload by a `TxIdentifier`; identifiers supplied by clients are never trusted.
//! - **Canonical Replies**: An empty reply payload means success; anything else is
//!   a JSON-encoded `SubmissionFailure`.

pub mod entities;
pub mod errors;
pub mod outcome;
pub mod provider;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use entities::*;
pub use errors::*;
pub use outcome::SubmissionOutcome;
pub use provider::{BincodeTxIdentifier, TxIdentifier, TxSubmitProvider};

/// Well-known durable queue carrying inbound submissions.
pub const TX_SUBMISSION_QUEUE: &str = "cardano-tx-submit";
