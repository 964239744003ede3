//! System DNS SRV lookups through hickory-resolver.

use crate::domain::{DiscoveryError, SrvRecord};
use crate::ports::SrvLookup;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

/// `SrvLookup` backed by a hickory async resolver.
#[derive(Clone)]
pub struct HickorySrvLookup {
    resolver: TokioAsyncResolver,
}

impl HickorySrvLookup {
    /// Use the host's resolver configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf() -> Result<Self, DiscoveryError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| DiscoveryError::lookup("system resolver", e.to_string()))?;
        Ok(Self { resolver })
    }

    /// Use an explicit resolver configuration.
    pub fn with_config(config: ResolverConfig, options: ResolverOpts) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(config, options),
        }
    }
}

#[async_trait]
impl SrvLookup for HickorySrvLookup {
    async fn lookup_srv(&self, service_name: &str) -> Result<Vec<SrvRecord>, DiscoveryError> {
        let answer = self
            .resolver
            .srv_lookup(service_name)
            .await
            .map_err(|e| DiscoveryError::lookup(service_name, e.to_string()))?;

        Ok(answer
            .iter()
            .map(|srv| {
                SrvRecord::new(
                    srv.target().to_utf8().trim_end_matches('.'),
                    srv.port(),
                    srv.priority(),
                    srv.weight(),
                )
            })
            .collect())
    }
}
