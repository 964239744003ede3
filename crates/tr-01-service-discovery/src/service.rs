//! # Resolver Service
//!
//! `DnsResolver` runs the lookup/backoff loop over an `SrvLookup`.

use crate::domain::{select_record, BackoffConfig, DiscoveryError};
use crate::ports::{ServiceResolver, SrvLookup};
use async_trait::async_trait;
use relay_telemetry::metric_inc;
use relay_telemetry::metrics::{
    DISCOVERY_LOOKUPS, LOOKUP_FAILED, LOOKUP_RESOLVED, LOOKUP_TIMEOUT,
};
use shared_types::ServiceLocation;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// SRV resolver with exponential backoff.
///
/// Holds no state besides its configuration, so one instance can serve
/// worker startup, failover and client construction concurrently.
#[derive(Clone)]
pub struct DnsResolver {
    lookup: Arc<dyn SrvLookup>,
    backoff: BackoffConfig,
}

impl DnsResolver {
    /// Create a resolver over `lookup`.
    pub fn new(lookup: Arc<dyn SrvLookup>, backoff: BackoffConfig) -> Self {
        Self { lookup, backoff }
    }

    /// The retry policy.
    #[must_use]
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    async fn attempt(&self, service_name: &str) -> Result<ServiceLocation, DiscoveryError> {
        let records = self.lookup.lookup_srv(service_name).await?;
        select_record(&records)
            .map(|record| record.location())
            .ok_or_else(|| DiscoveryError::NoRecords(service_name.to_string()))
    }
}

#[async_trait]
impl ServiceResolver for DnsResolver {
    async fn resolve(&self, service_name: &str) -> Result<ServiceLocation, DiscoveryError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let error = match self.attempt(service_name).await {
                Ok(location) => {
                    metric_inc!(DISCOVERY_LOOKUPS, &[LOOKUP_RESOLVED]);
                    info!(
                        service = service_name,
                        location = %location,
                        attempts,
                        "Service resolved"
                    );
                    return Ok(location);
                }
                Err(error) => error,
            };
            metric_inc!(DISCOVERY_LOOKUPS, &[LOOKUP_FAILED]);

            let elapsed = started.elapsed();
            if elapsed >= self.backoff.max_retry_time {
                metric_inc!(DISCOVERY_LOOKUPS, &[LOOKUP_TIMEOUT]);
                warn!(
                    service = service_name,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %error,
                    "Service discovery gave up"
                );
                return Err(DiscoveryError::Timeout {
                    service: service_name.to_string(),
                    attempts,
                    last_error: error.to_string(),
                });
            }

            let delay = self
                .backoff
                .delay_for(attempts - 1)
                .min(self.backoff.max_retry_time - elapsed);
            debug!(
                service = service_name,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "SRV lookup failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
