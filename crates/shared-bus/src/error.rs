//! Broker errors.

use thiserror::Error;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("Broker connection failed: {0}")]
    Connection(String),

    /// The connection was closed, by the broker or by the network.
    #[error("Broker connection closed: {0}")]
    ConnectionClosed(String),

    /// The channel was closed.
    #[error("Broker channel closed: {0}")]
    ChannelClosed(String),

    /// The queue does not exist.
    #[error("Queue {0} not found")]
    QueueNotFound(String),

    /// The delivery tag is not outstanding on this channel.
    #[error("Unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    /// The consumer tag is not registered on this channel.
    #[error("Unknown consumer {0}")]
    UnknownConsumer(String),

    /// The broker URL is not usable.
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    /// Any other protocol-level failure.
    #[error("Broker protocol error: {0}")]
    Protocol(String),
}

impl BrokerError {
    /// Whether this error means the connection or channel is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed(_) | Self::ChannelClosed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_closed() {
        assert!(BrokerError::ChannelClosed("x".into()).is_closed());
        assert!(BrokerError::Connection("refused".into()).is_closed());
        assert!(!BrokerError::QueueNotFound("q".into()).is_closed());
    }
}
