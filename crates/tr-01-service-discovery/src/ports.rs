//! # Ports
//!
//! `SrvLookup` is what this crate needs from the host (a DNS client).
//! `ServiceResolver` is what it offers to the worker, the client and the
//! runtime wiring.

use crate::domain::{DiscoveryError, ServiceTarget, SrvRecord};
use async_trait::async_trait;
use shared_types::ServiceLocation;

/// Performs one SRV query.
///
/// Implementations should not retry; the resolver owns the retry policy.
#[async_trait]
pub trait SrvLookup: Send + Sync {
    /// Query SRV records for `service_name`.
    async fn lookup_srv(&self, service_name: &str) -> Result<Vec<SrvRecord>, DiscoveryError>;
}

/// Resolves services to concrete locations.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Resolve an SRV name, retrying per the configured backoff.
    async fn resolve(&self, service_name: &str) -> Result<ServiceLocation, DiscoveryError>;

    /// Resolve a target. Static targets are returned without any lookup.
    async fn resolve_target(
        &self,
        target: &ServiceTarget,
    ) -> Result<ServiceLocation, DiscoveryError> {
        match target {
            ServiceTarget::Static(location) => Ok(location.clone()),
            ServiceTarget::Srv(name) => self.resolve(name).await,
        }
    }
}
