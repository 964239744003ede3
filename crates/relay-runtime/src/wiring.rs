//! # Wiring
//!
//! Builds relay components from a `RelayConfig` and a set of backends.
//!
//! Every worker built here locates the broker afresh: through SRV when a
//! service name is configured, otherwise from the static URL. Supervised
//! workers therefore follow the broker when it moves.

use crate::config::RelayConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use shared_bus::{BrokerConnector, BrokerUrl};
use shared_types::{TxIdentifier, TxSubmitProvider};
use std::sync::Arc;
use tr_01_service_discovery::{ServiceResolver, ServiceTarget};
use tr_02_submission_worker::TxSubmitWorker;
use tr_03_submit_client::{BrokerProviderFactory, BrokerTxSubmitProvider, DiscoveringTxSubmitProvider};
use tr_04_worker_supervisor::{
    start_with_discovery, RunningWorker, SupervisedWorker, SupervisorError, WorkerFactory,
};
use tracing::info;

/// Backends shared by everything the runtime builds.
#[derive(Clone)]
pub struct RelayBackends {
    /// Broker transport.
    pub connector: Arc<dyn BrokerConnector>,
    /// Service resolver.
    pub resolver: Arc<dyn ServiceResolver>,
    /// Transaction identifier agreed between worker and client.
    pub identifier: Arc<dyn TxIdentifier>,
}

#[cfg(all(feature = "amqp", feature = "dns"))]
impl RelayBackends {
    /// lapin broker, system DNS resolver and the bincode identifier.
    pub fn system(config: &RelayConfig) -> Result<Self> {
        use shared_bus::AmqpConnector;
        use shared_types::BincodeTxIdentifier;
        use tr_01_service_discovery::{DnsResolver, HickorySrvLookup};

        let lookup = HickorySrvLookup::from_system_conf()
            .context("Failed to read system resolver configuration")?;
        Ok(Self {
            connector: Arc::new(AmqpConnector::new().with_connection_name("tx-relay")),
            resolver: Arc::new(DnsResolver::new(Arc::new(lookup), config.discovery)),
            identifier: Arc::new(BincodeTxIdentifier),
        })
    }
}

/// Locate the broker: SRV when configured, the static URL otherwise.
pub async fn broker_url(resolver: &dyn ServiceResolver, config: &RelayConfig) -> Result<BrokerUrl> {
    if let Some(name) = config.srv_name() {
        let location = resolver
            .resolve(name)
            .await
            .with_context(|| format!("Failed to discover broker {name}"))?;
        return Ok(BrokerUrl::from_host_port(&location.host, location.port));
    }
    let url = config
        .rabbitmq_url
        .as_deref()
        .context("No broker URL or SRV name configured")?;
    BrokerUrl::parse(url).context("Invalid TR_RABBITMQ_URL")
}

/// Build an unstarted worker against the current broker location.
pub async fn load_tx_worker(
    backends: &RelayBackends,
    provider: Arc<dyn TxSubmitProvider>,
    config: &RelayConfig,
) -> Result<TxSubmitWorker> {
    let url = broker_url(backends.resolver.as_ref(), config).await?;
    info!(broker = %url, parallel = config.parallel, "Loading submission worker");
    Ok(TxSubmitWorker::new(
        config.worker_config(url),
        Arc::clone(&backends.connector),
        provider,
        Arc::clone(&backends.identifier),
    ))
}

/// Build and start a worker without supervision.
pub async fn get_running_tx_submit_worker(
    backends: &RelayBackends,
    provider: Arc<dyn TxSubmitProvider>,
    config: &RelayConfig,
) -> Result<TxSubmitWorker> {
    let worker = load_tx_worker(backends, provider, config).await?;
    worker
        .start()
        .await
        .context("Failed to start submission worker")?;
    Ok(worker)
}

/// Start a supervised worker that is rebuilt, with fresh discovery, after
/// every broker connection failure.
pub async fn load_and_start_tx_worker(
    backends: &RelayBackends,
    provider: Arc<dyn TxSubmitProvider>,
    config: &RelayConfig,
) -> Result<RunningWorker> {
    config.validate().context("Invalid relay configuration")?;
    let factory = Arc::new(DiscoveringWorkerFactory {
        backends: backends.clone(),
        provider,
        config: config.clone(),
    });
    start_with_discovery(factory, config.supervisor_config())
        .await
        .context("Failed to start supervised submission worker")
}

/// Build a client that submits through the broker.
///
/// With an SRV name the client discovers the broker lazily and rediscovers
/// it after a connection failure; otherwise it connects to the static URL
/// right away.
pub async fn get_broker_tx_submit_provider(
    backends: &RelayBackends,
    config: &RelayConfig,
) -> Result<Arc<dyn TxSubmitProvider>> {
    if let Some(name) = config.srv_name() {
        info!(service = name, "Using discovery-aware submit client");
        let factory = BrokerProviderFactory::new(
            Arc::clone(&backends.connector),
            Arc::clone(&backends.identifier),
        );
        return Ok(Arc::new(DiscoveringTxSubmitProvider::new(
            Arc::clone(&backends.resolver),
            ServiceTarget::Srv(name.to_string()),
            Arc::new(factory),
        )));
    }

    let url = broker_url(backends.resolver.as_ref(), config).await?;
    let client = BrokerTxSubmitProvider::connect(
        backends.connector.as_ref(),
        &url,
        Arc::clone(&backends.identifier),
    )
    .await
    .with_context(|| format!("Failed to connect submit client to {url}"))?;
    Ok(Arc::new(client))
}

struct DiscoveringWorkerFactory {
    backends: RelayBackends,
    provider: Arc<dyn TxSubmitProvider>,
    config: RelayConfig,
}

#[async_trait]
impl WorkerFactory for DiscoveringWorkerFactory {
    async fn create(&self) -> Result<Arc<dyn SupervisedWorker>, SupervisorError> {
        let worker = load_tx_worker(&self.backends, Arc::clone(&self.provider), &self.config)
            .await
            .map_err(|error| SupervisorError::factory(format!("{error:#}")))?;
        Ok(Arc::new(worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::InMemoryBroker;
    use shared_types::testing::{signed_tx, MockTxSubmitProvider};
    use shared_types::{BincodeTxIdentifier, WorkerStatus};
    use std::time::Duration;
    use tokio::time::timeout;
    use tr_01_service_discovery::testing::ScriptedSrvLookup;
    use tr_01_service_discovery::{BackoffConfig, DnsResolver, SrvRecord};

    fn backends(broker: &InMemoryBroker, lookup: Arc<ScriptedSrvLookup>) -> RelayBackends {
        RelayBackends {
            connector: Arc::new(broker.clone()),
            resolver: Arc::new(DnsResolver::new(
                lookup,
                BackoffConfig::new(1.1, Duration::from_millis(500)),
            )),
            identifier: Arc::new(BincodeTxIdentifier),
        }
    }

    fn srv_config() -> RelayConfig {
        RelayConfig {
            rabbitmq_srv_service_name: Some("_amqp._tcp.mq".into()),
            polling_cycle: Duration::from_millis(20),
            supervisor_retry: Duration::from_millis(20),
            ..RelayConfig::default()
        }
    }

    fn record(host: &str) -> Vec<SrvRecord> {
        vec![SrvRecord::new(format!("{host}."), 5672, 0, 0)]
    }

    #[tokio::test]
    async fn test_broker_url_static_and_srv() {
        let lookup = Arc::new(ScriptedSrvLookup::new());
        lookup.push_records(record("mq-1.internal"));
        let broker = InMemoryBroker::new();
        let backends = backends(&broker, lookup.clone());

        let url = broker_url(backends.resolver.as_ref(), &RelayConfig::default())
            .await
            .unwrap();
        assert_eq!(url, BrokerUrl::localhost());
        assert_eq!(lookup.calls(), 0);

        let url = broker_url(backends.resolver.as_ref(), &srv_config())
            .await
            .unwrap();
        assert_eq!(url.as_str(), "amqp://mq-1.internal:5672");
    }

    #[tokio::test]
    async fn test_running_worker_uses_config() {
        let broker = InMemoryBroker::new();
        let backends = backends(&broker, Arc::new(ScriptedSrvLookup::new()));
        let config = RelayConfig {
            parallel: true,
            ..RelayConfig::default()
        };

        let worker = get_running_tx_submit_worker(
            &backends,
            Arc::new(MockTxSubmitProvider::new()),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(worker.status(), WorkerStatus::Connected);
        assert!(worker.config().parallel);
        assert_eq!(broker.consumer_count(shared_types::TX_SUBMISSION_QUEUE), 1);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_supervised_worker_follows_broker() {
        let lookup = Arc::new(ScriptedSrvLookup::new());
        lookup.push_records(record("mq-1"));
        lookup.set_fallback_records(record("mq-2"));
        let broker = InMemoryBroker::new();
        let backends = backends(&broker, lookup);

        let running = load_and_start_tx_worker(
            &backends,
            Arc::new(MockTxSubmitProvider::new()),
            &srv_config(),
        )
        .await
        .unwrap();

        broker.close_channels_with_error("failover");
        timeout(Duration::from_secs(5), async {
            while running.replacements() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let urls: Vec<String> = broker
            .connected_urls()
            .iter()
            .map(|url| url.as_str().to_string())
            .collect();
        assert_eq!(urls, vec!["amqp://mq-1:5672", "amqp://mq-2:5672"]);
        running.stop().await;
    }

    #[tokio::test]
    async fn test_static_client_round_trip() {
        let broker = InMemoryBroker::new();
        let backends = backends(&broker, Arc::new(ScriptedSrvLookup::new()));
        let config = RelayConfig {
            polling_cycle: Duration::from_millis(10),
            ..RelayConfig::default()
        };
        let upstream = Arc::new(MockTxSubmitProvider::new());
        let worker = get_running_tx_submit_worker(&backends, upstream.clone(), &config)
            .await
            .unwrap();
        let client = get_broker_tx_submit_provider(&backends, &config)
            .await
            .unwrap();

        let tx = signed_tx(b"wired");
        let result = timeout(Duration::from_secs(5), client.submit_tx(&tx.to_bytes()))
            .await
            .unwrap();

        assert_eq!(result, Ok(()));
        assert_eq!(upstream.submitted(), vec![tx.to_bytes()]);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_srv_client_is_lazy() {
        let lookup = Arc::new(ScriptedSrvLookup::new());
        let broker = InMemoryBroker::new();
        let backends = backends(&broker, lookup.clone());

        let client = get_broker_tx_submit_provider(&backends, &srv_config())
            .await
            .unwrap();

        assert_eq!(lookup.calls(), 0);
        assert_eq!(broker.connect_attempts(), 0);
        drop(client);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_connecting() {
        let broker = InMemoryBroker::new();
        let backends = backends(&broker, Arc::new(ScriptedSrvLookup::new()));
        let config = RelayConfig {
            parallel_txs: 0,
            ..RelayConfig::default()
        };

        let err = load_and_start_tx_worker(&backends, Arc::new(MockTxSubmitProvider::new()), &config)
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("parallel_txs"));
        assert_eq!(broker.connect_attempts(), 0);
    }
}
