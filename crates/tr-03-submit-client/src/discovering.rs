//! # Discovery-Aware Provider
//!
//! Wraps any `TxSubmitProvider` that lives at a discoverable location. The
//! inner provider is built on first use; after a connection failure it is
//! dropped, the service is resolved again and the call is retried once.

use crate::error::SubmitClientError;
use async_trait::async_trait;
use shared_types::{
    FailureKind, HealthCheckResponse, ServiceLocation, SubmissionFailure, TxSubmitProvider,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tr_01_service_discovery::{ServiceResolver, ServiceTarget};
use tracing::{debug, info, warn};

/// Builds a provider bound to a resolved location.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Build a provider talking to `location`.
    async fn build(
        &self,
        location: &ServiceLocation,
    ) -> Result<Arc<dyn TxSubmitProvider>, SubmitClientError>;
}

/// `TxSubmitProvider` that locates its upstream through a resolver.
pub struct DiscoveringTxSubmitProvider {
    resolver: Arc<dyn ServiceResolver>,
    target: ServiceTarget,
    factory: Arc<dyn ProviderFactory>,
    current: Mutex<Option<Arc<dyn TxSubmitProvider>>>,
}

impl DiscoveringTxSubmitProvider {
    /// Create a provider; nothing is resolved until the first call.
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        target: ServiceTarget,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            resolver,
            target,
            factory,
            current: Mutex::new(None),
        }
    }

    /// The target this provider resolves.
    #[must_use]
    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    async fn provider(&self) -> Result<Arc<dyn TxSubmitProvider>, SubmitClientError> {
        let mut current = self.current.lock().await;
        if let Some(provider) = current.as_ref() {
            return Ok(Arc::clone(provider));
        }
        let location = self.resolver.resolve_target(&self.target).await?;
        debug!(location = %location, "Building upstream provider");
        let provider = self.factory.build(&location).await?;
        *current = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Drop `stale` if it is still the current provider. Its resources go
    /// with the last handle, which for a broker client closes the connection.
    async fn discard(&self, stale: Option<&Arc<dyn TxSubmitProvider>>) {
        let mut current = self.current.lock().await;
        let matches = match (current.as_ref(), stale) {
            (Some(held), Some(stale)) => Arc::ptr_eq(held, stale),
            (_, None) => true,
            (None, Some(_)) => false,
        };
        if matches {
            *current = None;
        }
    }

    async fn attempt(&self, raw: &[u8]) -> Attempt {
        match self.provider().await {
            Ok(provider) => match provider.submit_tx(raw).await {
                Err(failure) if failure.kind == FailureKind::ConnectionFailure => {
                    Attempt::Lost(Some(provider), failure)
                }
                result => Attempt::Done(result),
            },
            Err(error) => Attempt::Lost(None, error.into()),
        }
    }
}

enum Attempt {
    Done(Result<(), SubmissionFailure>),
    Lost(Option<Arc<dyn TxSubmitProvider>>, SubmissionFailure),
}

#[async_trait]
impl TxSubmitProvider for DiscoveringTxSubmitProvider {
    async fn health_check(&self) -> HealthCheckResponse {
        match self.provider().await {
            Ok(provider) => provider.health_check().await,
            Err(error) => {
                warn!(error = %error, "Upstream provider unavailable");
                HealthCheckResponse::unhealthy()
            }
        }
    }

    async fn submit_tx(&self, signed_transaction: &[u8]) -> Result<(), SubmissionFailure> {
        let (stale, failure) = match self.attempt(signed_transaction).await {
            Attempt::Done(result) => return result,
            Attempt::Lost(stale, failure) => (stale, failure),
        };

        info!(error = %failure, "Upstream connection lost, rediscovering");
        self.discard(stale.as_ref()).await;

        match self.attempt(signed_transaction).await {
            Attempt::Done(result) => result,
            Attempt::Lost(stale, failure) => {
                self.discard(stale.as_ref()).await;
                Err(failure)
            }
        }
    }
}
