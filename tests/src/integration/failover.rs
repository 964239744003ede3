//! # Failover
//!
//! Broker loss seen from both ends: the supervised worker is rebuilt against
//! a freshly discovered broker, and the discovery-aware client reconnects on
//! its next call.

#[cfg(test)]
mod tests {
    use crate::integration::support::eventually;
    use relay_runtime::{
        get_broker_tx_submit_provider, load_and_start_tx_worker, RelayBackends, RelayConfig,
    };
    use shared_bus::InMemoryBroker;
    use shared_types::testing::{signed_tx, MockTxSubmitProvider};
    use shared_types::{BincodeTxIdentifier, WorkerStatus};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tr_01_service_discovery::testing::ScriptedSrvLookup;
    use tr_01_service_discovery::{BackoffConfig, DnsResolver, SrvRecord};

    fn backends(broker: &InMemoryBroker, lookup: Arc<ScriptedSrvLookup>) -> RelayBackends {
        RelayBackends {
            connector: Arc::new(broker.clone()),
            resolver: Arc::new(DnsResolver::new(
                lookup,
                BackoffConfig::new(1.1, Duration::from_secs(1))
                    .with_initial_delay(Duration::from_millis(10)),
            )),
            identifier: Arc::new(BincodeTxIdentifier),
        }
    }

    fn config() -> RelayConfig {
        RelayConfig {
            rabbitmq_srv_service_name: Some("_amqp._tcp.rabbitmq".into()),
            polling_cycle: Duration::from_millis(10),
            supervisor_retry: Duration::from_millis(20),
            ..RelayConfig::default()
        }
    }

    fn mq(host: &str) -> Vec<SrvRecord> {
        vec![SrvRecord::new(format!("{host}."), 5672, 0, 5)]
    }

    #[tokio::test]
    async fn test_worker_and_client_survive_broker_restart() {
        let broker = InMemoryBroker::new();
        let lookup = Arc::new(ScriptedSrvLookup::new());
        lookup.set_fallback_records(mq("rabbitmq-0"));
        let backends = backends(&broker, lookup.clone());
        let upstream = Arc::new(MockTxSubmitProvider::new());

        let running = load_and_start_tx_worker(&backends, upstream.clone(), &config())
            .await
            .unwrap();
        let client = get_broker_tx_submit_provider(&backends, &config())
            .await
            .unwrap();

        let before = timeout(
            Duration::from_secs(5),
            client.submit_tx(&signed_tx(b"before").to_bytes()),
        )
        .await
        .unwrap();
        assert_eq!(before, Ok(()));

        broker.close_channels_with_error("CONNECTION_FORCED - broker shutdown");
        eventually(Duration::from_secs(5), || running.replacements() == 1).await;
        assert_eq!(running.status(), WorkerStatus::Connected);

        let after = timeout(
            Duration::from_secs(5),
            client.submit_tx(&signed_tx(b"after").to_bytes()),
        )
        .await
        .unwrap();
        assert_eq!(after, Ok(()));
        assert_eq!(upstream.submit_count(), 2);

        running.stop().await;
        assert_eq!(running.status(), WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_replacement_waits_out_discovery_outage() {
        let broker = InMemoryBroker::new();
        let lookup = Arc::new(ScriptedSrvLookup::new());
        lookup.push_records(mq("rabbitmq-0"));
        lookup.set_fallback_error("SERVFAIL");
        let backends = backends(&broker, lookup.clone());
        let running = load_and_start_tx_worker(
            &backends,
            Arc::new(MockTxSubmitProvider::new()),
            &config(),
        )
        .await
        .unwrap();

        broker.close_channels_with_error("node drained");
        eventually(Duration::from_secs(10), || lookup.calls() >= 5).await;
        assert_eq!(running.replacements(), 0);

        lookup.set_fallback_records(mq("rabbitmq-1"));
        eventually(Duration::from_secs(10), || running.replacements() == 1).await;

        let last = broker.connected_urls().last().cloned().unwrap();
        assert_eq!(last.as_str(), "amqp://rabbitmq-1:5672");
        running.stop().await;
        assert_eq!(broker.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_stop_during_failover_leaves_nothing_running() {
        let broker = InMemoryBroker::new();
        let lookup = Arc::new(ScriptedSrvLookup::new());
        lookup.set_fallback_records(mq("rabbitmq-0"));
        let backends = backends(&broker, lookup);
        let running = load_and_start_tx_worker(
            &backends,
            Arc::new(MockTxSubmitProvider::new()),
            &config(),
        )
        .await
        .unwrap();

        for _ in 0..5 {
            broker.close_channels_with_error("flapping");
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        running.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(running.status(), WorkerStatus::Idle);
        assert_eq!(broker.open_connections(), 0);
    }
}
