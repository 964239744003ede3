//! Worker configuration.

use shared_bus::BrokerUrl;
use std::time::Duration;

/// Default prefetch in parallel mode.
pub const DEFAULT_PARALLEL_TXS: u16 = 3;

/// Default sleep between empty polls in serial mode.
pub const DEFAULT_POLLING_CYCLE: Duration = Duration::from_millis(500);

/// Worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Push consumer with prefetch instead of the polling loop.
    pub parallel: bool,
    /// Prefetch count (parallel mode only).
    pub parallel_txs: u16,
    /// Sleep after an empty poll (serial mode only).
    pub polling_cycle: Duration,
    /// Broker to connect to.
    pub broker_url: BrokerUrl,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            parallel_txs: DEFAULT_PARALLEL_TXS,
            polling_cycle: DEFAULT_POLLING_CYCLE,
            broker_url: BrokerUrl::localhost(),
        }
    }
}

impl WorkerConfig {
    /// Default settings against `broker_url`.
    pub fn new(broker_url: BrokerUrl) -> Self {
        Self {
            broker_url,
            ..Self::default()
        }
    }

    /// Switch to parallel mode with the given prefetch.
    #[must_use]
    pub fn parallel(mut self, parallel_txs: u16) -> Self {
        self.parallel = true;
        self.parallel_txs = parallel_txs;
        self
    }

    /// Set the serial-mode polling interval.
    #[must_use]
    pub fn with_polling_cycle(mut self, polling_cycle: Duration) -> Self {
        self.polling_cycle = polling_cycle;
        self
    }
}
