//! Reply payload codec.
//!
//! The worker publishes exactly one reply per terminal outcome. An empty
//! payload is the canonical success; `{}` is accepted as success too.

use crate::errors::{FailureKind, SubmissionFailure};

/// Terminal outcome of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The upstream accepted the transaction.
    Success,
    /// The upstream rejected the transaction for good.
    Failure(SubmissionFailure),
}

impl SubmissionOutcome {
    /// Encode as a reply payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Success => Vec::new(),
            // A struct of an enum and a String always serializes.
            Self::Failure(failure) => serde_json::to_vec(failure).unwrap_or_default(),
        }
    }

    /// Decode a reply payload.
    ///
    /// Payloads that are not a recognizable failure object still decode to a
    /// failure (`Unknown`) carrying the raw text, so a requester is never left
    /// with an undecodable reply.
    pub fn decode(payload: &[u8]) -> Self {
        if payload.is_empty() {
            return Self::Success;
        }
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(payload) {
            if map.is_empty() {
                return Self::Success;
            }
        }
        match serde_json::from_slice::<SubmissionFailure>(payload) {
            Ok(failure) => Self::Failure(failure),
            Err(_) => Self::Failure(SubmissionFailure::new(
                FailureKind::Unknown,
                String::from_utf8_lossy(payload).into_owned(),
            )),
        }
    }

    /// Whether this is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Convert into the provider-level result.
    pub fn into_result(self) -> Result<(), SubmissionFailure> {
        match self {
            Self::Success => Ok(()),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<(), SubmissionFailure>> for SubmissionOutcome {
    fn from(result: Result<(), SubmissionFailure>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(failure) => Self::Failure(failure),
        }
    }
}
