//! Integration tests across relay crates.

pub mod failover;
pub mod round_trip;
pub mod scenarios;

#[cfg(test)]
pub(crate) mod support {
    use shared_bus::{BrokerUrl, InMemoryBroker};
    use shared_types::testing::MockTxSubmitProvider;
    use shared_types::BincodeTxIdentifier;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tr_02_submission_worker::{TxSubmitWorker, WorkerConfig};

    /// A worker on `broker` with the bincode identifier.
    pub fn worker(
        broker: &InMemoryBroker,
        provider: Arc<MockTxSubmitProvider>,
        config: WorkerConfig,
    ) -> TxSubmitWorker {
        TxSubmitWorker::new(
            config,
            Arc::new(broker.clone()),
            provider,
            Arc::new(BincodeTxIdentifier),
        )
    }

    /// Serial worker settings with a short polling cycle.
    pub fn fast_serial() -> WorkerConfig {
        WorkerConfig::new(BrokerUrl::localhost()).with_polling_cycle(Duration::from_millis(10))
    }

    /// Poll `condition` until it holds, failing after `limit`.
    pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) {
        timeout(limit, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}
