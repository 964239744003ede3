//! Client errors.

use shared_bus::BrokerError;
use shared_types::SubmissionFailure;
use thiserror::Error;
use tr_01_service_discovery::DiscoveryError;

/// Errors building or driving a submit client.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmitClientError {
    /// Broker connection or channel failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The service could not be located.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl From<SubmitClientError> for SubmissionFailure {
    fn from(error: SubmitClientError) -> Self {
        SubmissionFailure::connection(error.to_string())
    }
}
