//! Discovery domain: pure logic with no I/O.

mod backoff;
mod errors;
mod srv;

pub use backoff::BackoffConfig;
pub use errors::DiscoveryError;
pub use srv::{select_record, ServiceTarget, SrvRecord};
