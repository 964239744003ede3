//! # Error Types
//!
//! Submission failures as reported by upstream providers and relayed back to
//! the original submitter over the reply queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether a failed submission may be attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClassification {
    /// Transient failure; the message is requeued and no reply is sent.
    Retryable,
    /// Terminal failure; the message is removed and the failure is replied.
    Fatal,
}

/// Category of a submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The upstream endpoint could not be reached.
    ConnectionFailure,
    /// The upstream endpoint did not answer in time.
    Timeout,
    /// The upstream endpoint reported itself unhealthy.
    Unhealthy,
    /// The payload could not be decoded as a signed transaction.
    MalformedTransaction,
    /// The transaction was built for a different ledger era.
    EraMismatch,
    /// The transaction is already part of the ledger.
    AlreadyInLedger,
    /// Inputs and outputs do not balance.
    ValueNotConserved,
    /// The attached fee is below the minimum.
    FeeTooSmall,
    /// A witness signature does not verify.
    InvalidSignature,
    /// Any other validity rejection.
    Rejected,
    /// The failure could not be categorized.
    Unknown,
}

impl FailureKind {
    /// Classify a failure for retry purposes.
    ///
    /// Only transport-level problems are retried; every rejection by the
    /// upstream (and every undecodable payload) is final.
    #[must_use]
    pub fn classify(self) -> RetryClassification {
        match self {
            Self::ConnectionFailure | Self::Timeout | Self::Unhealthy => {
                RetryClassification::Retryable
            }
            _ => RetryClassification::Fatal,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionFailure => "ConnectionFailure",
            Self::Timeout => "Timeout",
            Self::Unhealthy => "Unhealthy",
            Self::MalformedTransaction => "MalformedTransaction",
            Self::EraMismatch => "EraMismatch",
            Self::AlreadyInLedger => "AlreadyInLedger",
            Self::ValueNotConserved => "ValueNotConserved",
            Self::FeeTooSmall => "FeeTooSmall",
            Self::InvalidSignature => "InvalidSignature",
            Self::Rejected => "Rejected",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A typed submission failure.
///
/// This is both the error type of `TxSubmitProvider::submit_tx` and the
/// JSON body of a failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {details}")]
pub struct SubmissionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable details from the upstream.
    #[serde(default)]
    pub details: String,
}

impl SubmissionFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
        }
    }

    /// Upstream connection failure.
    pub fn connection(details: impl Into<String>) -> Self {
        Self::new(FailureKind::ConnectionFailure, details)
    }

    /// Upstream unhealthy.
    pub fn unhealthy() -> Self {
        Self::new(FailureKind::Unhealthy, "provider reported unhealthy")
    }

    /// Retry classification of this failure.
    #[must_use]
    pub fn classify(&self) -> RetryClassification {
        self.kind.classify()
    }

    /// Shorthand for `classify() == Retryable`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.classify() == RetryClassification::Retryable
    }
}

impl From<MalformedTransaction> for SubmissionFailure {
    fn from(err: MalformedTransaction) -> Self {
        Self::new(FailureKind::MalformedTransaction, err.reason)
    }
}

/// A payload that could not be decoded far enough to identify it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed transaction: {reason}")]
pub struct MalformedTransaction {
    /// Decoder message.
    pub reason: String,
}

impl MalformedTransaction {
    /// Create a new decoding error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
