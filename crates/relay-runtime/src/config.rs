//! # Relay Configuration
//!
//! Defaults suit a local broker. Every field can be overridden from the
//! environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TR_RABBITMQ_URL` | `rabbitmq_url` |
//! | `TR_RABBITMQ_SRV_SERVICE_NAME` | `rabbitmq_srv_service_name` |
//! | `TR_SERVICE_DISCOVERY_BACKOFF_FACTOR` | `discovery.factor` |
//! | `TR_SERVICE_DISCOVERY_TIMEOUT_MS` | `discovery.max_retry_time` |
//! | `TR_PARALLEL` | `parallel` |
//! | `TR_PARALLEL_TXS` | `parallel_txs` |
//! | `TR_POLLING_CYCLE_MS` | `polling_cycle` |
//! | `TR_SUPERVISOR_RETRY_MS` | `supervisor_retry` |
//!
//! A configured SRV name takes precedence over the static URL.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use shared_bus::{BrokerError, BrokerUrl};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tr_01_service_discovery::BackoffConfig;
use tr_02_submission_worker::WorkerConfig;
use tr_04_worker_supervisor::SupervisorConfig;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Neither a URL nor an SRV name is configured.
    #[error("No broker configured: set TR_RABBITMQ_URL or TR_RABBITMQ_SRV_SERVICE_NAME")]
    MissingBrokerTarget,

    /// An environment variable could not be parsed.
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// Parallel mode needs a positive prefetch.
    #[error("parallel_txs must be at least 1")]
    ZeroParallelTxs,

    /// The polling loop needs a positive interval.
    #[error("polling_cycle must be positive")]
    ZeroPollingCycle,

    /// Delays must not shrink.
    #[error("Backoff factor must be a finite number >= 1.0, got {0}")]
    InvalidBackoffFactor(f64),

    /// The static broker URL is unusable.
    #[error(transparent)]
    BrokerUrl(#[from] BrokerError),
}

/// Complete relay configuration.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Static broker URL.
    pub rabbitmq_url: Option<String>,
    /// SRV name of the broker; wins over `rabbitmq_url`.
    pub rabbitmq_srv_service_name: Option<String>,
    /// Backoff for SRV resolution.
    pub discovery: BackoffConfig,
    /// Worker consumption mode.
    pub parallel: bool,
    /// Worker prefetch in parallel mode.
    pub parallel_txs: u16,
    /// Worker sleep after an empty poll.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub polling_cycle: Duration,
    /// Pause between failed worker replacements.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub supervisor_retry: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self {
            rabbitmq_url: Some(BrokerUrl::localhost().as_str().to_string()),
            rabbitmq_srv_service_name: None,
            discovery: BackoffConfig::default(),
            parallel: worker.parallel,
            parallel_txs: worker.parallel_txs,
            polling_cycle: worker.polling_cycle,
            supervisor_retry: SupervisorConfig::default().retry_interval,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `TR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = var("TR_RABBITMQ_URL") {
            config.rabbitmq_url = Some(url);
        }
        if let Some(name) = var("TR_RABBITMQ_SRV_SERVICE_NAME") {
            config.rabbitmq_srv_service_name = Some(name);
        }
        if let Some(raw) = var("TR_SERVICE_DISCOVERY_BACKOFF_FACTOR") {
            config.discovery.factor = parse("TR_SERVICE_DISCOVERY_BACKOFF_FACTOR", &raw)?;
        }
        if let Some(raw) = var("TR_SERVICE_DISCOVERY_TIMEOUT_MS") {
            config.discovery.max_retry_time =
                Duration::from_millis(parse("TR_SERVICE_DISCOVERY_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = var("TR_PARALLEL") {
            config.parallel = parse_flag("TR_PARALLEL", &raw)?;
        }
        if let Some(raw) = var("TR_PARALLEL_TXS") {
            config.parallel_txs = parse("TR_PARALLEL_TXS", &raw)?;
        }
        if let Some(raw) = var("TR_POLLING_CYCLE_MS") {
            config.polling_cycle = Duration::from_millis(parse("TR_POLLING_CYCLE_MS", &raw)?);
        }
        if let Some(raw) = var("TR_SUPERVISOR_RETRY_MS") {
            config.supervisor_retry = Duration::from_millis(parse("TR_SUPERVISOR_RETRY_MS", &raw)?);
        }

        Ok(config)
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.srv_name().is_none() {
            match self.rabbitmq_url.as_deref().map(str::trim) {
                None | Some("") => return Err(ConfigError::MissingBrokerTarget),
                Some(url) => {
                    BrokerUrl::parse(url)?;
                }
            }
        }
        if self.parallel_txs == 0 {
            return Err(ConfigError::ZeroParallelTxs);
        }
        if self.polling_cycle.is_zero() {
            return Err(ConfigError::ZeroPollingCycle);
        }
        if !self.discovery.is_valid() {
            return Err(ConfigError::InvalidBackoffFactor(self.discovery.factor));
        }
        Ok(())
    }

    /// The SRV name, if one is set.
    #[must_use]
    pub fn srv_name(&self) -> Option<&str> {
        self.rabbitmq_srv_service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Worker settings for a resolved broker.
    #[must_use]
    pub fn worker_config(&self, broker_url: BrokerUrl) -> WorkerConfig {
        WorkerConfig {
            parallel: self.parallel,
            parallel_txs: self.parallel_txs,
            polling_cycle: self.polling_cycle,
            broker_url,
        }
    }

    /// Supervisor settings.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            retry_interval: self.supervisor_retry,
        }
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}
