//! Broker URLs.

use crate::error::BrokerError;
use crate::DEFAULT_AMQP_PORT;
use std::fmt;

/// An `amqp://` or `amqps://` broker URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerUrl(String);

impl BrokerUrl {
    /// Parse and validate a broker URL.
    pub fn parse(url: &str) -> Result<Self, BrokerError> {
        let trimmed = url.trim();
        let rest = trimmed
            .strip_prefix("amqp://")
            .or_else(|| trimmed.strip_prefix("amqps://"))
            .ok_or_else(|| BrokerError::InvalidUrl(format!("unsupported scheme in {url}")))?;
        let authority = rest.split('/').next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        if host.is_empty() || host.starts_with(':') {
            return Err(BrokerError::InvalidUrl(format!("missing host in {url}")));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build `amqp://host:port` from a resolved location.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self(format!("amqp://{host}:{port}"))
    }

    /// `amqp://host` on the default port.
    pub fn localhost() -> Self {
        Self::from_host_port("localhost", DEFAULT_AMQP_PORT)
    }

    /// The full URL, including credentials.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL with any `user:password@` part removed, for logging.
    pub fn redacted(&self) -> String {
        let (scheme, rest) = self.0.split_once("://").unwrap_or(("amqp", &self.0));
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (rest, None),
        };
        let host = authority.rsplit('@').next().unwrap_or(authority);
        match path {
            Some(path) => format!("{scheme}://{host}/{path}"),
            None => format!("{scheme}://{host}"),
        }
    }
}

impl fmt::Display for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
