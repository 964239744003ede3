//! # Service Discovery
//!
//! Resolves a symbolic service name (a DNS SRV name such as
//! `_amqp._tcp.rabbitmq.internal`) to a concrete `ServiceLocation`,
//! retrying failed or empty lookups with exponential backoff.
//!
//! ## Architecture
//!
//! - **Domain Layer:** backoff schedule, SRV record selection, errors
//! - **Ports Layer:** `SrvLookup` (driven) and `ServiceResolver` (driving)
//! - **Service Layer:** `DnsResolver` wires the backoff loop to a lookup
//! - **Adapters Layer:** hickory-resolver system lookup (feature `dns`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tr_01_service_discovery::{BackoffConfig, DnsResolver, ServiceResolver, ServiceTarget};
//!
//! let resolver = DnsResolver::new(Arc::new(lookup), BackoffConfig::default());
//! let target = ServiceTarget::Srv("_amqp._tcp.rabbitmq".into());
//! let location = resolver.resolve_target(&target).await?;
//! ```

pub mod domain;
pub mod ports;
pub mod service;

#[cfg(feature = "dns")]
pub mod adapters;

/// Test doubles for the lookup port.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use domain::{select_record, BackoffConfig, DiscoveryError, ServiceTarget, SrvRecord};
pub use ports::{ServiceResolver, SrvLookup};
pub use service::DnsResolver;

#[cfg(feature = "dns")]
pub use adapters::HickorySrvLookup;
