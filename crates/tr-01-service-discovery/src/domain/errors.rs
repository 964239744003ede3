//! Discovery errors.

use thiserror::Error;

/// Errors that can occur while resolving a service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// A single lookup failed (NXDOMAIN, server failure, I/O).
    #[error("SRV lookup for {service} failed: {reason}")]
    Lookup {
        /// Service name that was queried.
        service: String,
        /// Resolver-provided reason.
        reason: String,
    },

    /// The lookup succeeded but returned no usable records.
    #[error("SRV lookup for {0} returned no records")]
    NoRecords(String),

    /// Every attempt failed and the retry budget is spent.
    #[error("Discovery of {service} timed out after {attempts} attempts: {last_error}")]
    Timeout {
        /// Service name that was queried.
        service: String,
        /// Lookups performed.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
}

impl DiscoveryError {
    /// Shorthand for a failed lookup.
    pub fn lookup(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            service: service.into(),
            reason: reason.into(),
        }
    }
}
