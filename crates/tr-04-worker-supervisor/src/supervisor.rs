//! # Failover Loop
//!
//! The current worker lives in a single slot. Only the monitor task writes
//! it, and `RunningWorker::stop` joins the monitor before stopping whatever
//! the slot holds, so a replacement that finishes during `stop` is stopped
//! too.

use crate::error::SupervisorError;
use crate::ports::{SupervisedWorker, WorkerFactory};
use parking_lot::Mutex;
use relay_telemetry::metric_inc;
use relay_telemetry::metrics::SUPERVISOR_REPLACEMENTS;
use shared_types::WorkerStatus;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tr_02_submission_worker::FailureSubscription;
use tracing::{debug, error, info, warn};

/// Supervisor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Pause between failed replacement attempts.
    pub retry_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
        }
    }
}

struct Shared {
    factory: Arc<dyn WorkerFactory>,
    config: SupervisorConfig,
    current: Mutex<Arc<dyn SupervisedWorker>>,
    stopping: watch::Sender<bool>,
    replacements: AtomicU64,
}

/// Handle to a supervised worker.
pub struct RunningWorker {
    shared: Arc<Shared>,
    monitor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Build and start a worker, then keep replacing it on connection failure.
///
/// Errors from the first `create`/`start` are returned. Broker setup
/// failures of the first worker are not: they arrive as a failure
/// notification and are handled like any later connection loss.
pub async fn start_with_discovery(
    factory: Arc<dyn WorkerFactory>,
    config: SupervisorConfig,
) -> Result<RunningWorker, SupervisorError> {
    let worker = factory.create().await?;
    let failures = worker.subscribe_failures();
    worker.start().await?;
    info!(status = %worker.status(), "Supervised worker started");

    let (stopping, stop_rx) = watch::channel(false);
    let shared = Arc::new(Shared {
        factory,
        config,
        current: Mutex::new(worker),
        stopping,
        replacements: AtomicU64::new(0),
    });
    let monitor = tokio::spawn(Arc::clone(&shared).monitor(failures, stop_rx));

    Ok(RunningWorker {
        shared,
        monitor: tokio::sync::Mutex::new(Some(monitor)),
    })
}

impl RunningWorker {
    /// Stop supervising and stop the current worker. Idempotent.
    pub async fn stop(&self) {
        self.shared.stopping.send_replace(true);
        if let Some(monitor) = self.monitor.lock().await.take() {
            if let Err(join_error) = monitor.await {
                warn!(error = %join_error, "Supervisor monitor failed");
            }
        }
        let worker = self.current();
        worker.stop().await;
        info!("Supervised worker stopped");
    }

    /// Status of the current worker.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.current().status()
    }

    /// Workers installed after a failure.
    #[must_use]
    pub fn replacements(&self) -> u64 {
        self.shared.replacements.load(Ordering::SeqCst)
    }

    fn current(&self) -> Arc<dyn SupervisedWorker> {
        Arc::clone(&self.shared.current.lock())
    }
}

impl fmt::Debug for RunningWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningWorker")
            .field("status", &self.status())
            .field("replacements", &self.replacements())
            .field("retry_interval", &self.shared.config.retry_interval)
            .finish()
    }
}

impl Shared {
    async fn monitor(
        self: Arc<Self>,
        mut failures: FailureSubscription,
        mut stopping: watch::Receiver<bool>,
    ) {
        loop {
            let failure = tokio::select! {
                _ = stopping.changed() => return,
                failure = failures.recv() => failure,
            };
            match failure {
                Some(failure) => {
                    warn!(error = %failure, "Worker lost its broker connection, replacing");
                }
                None => {
                    debug!("Failure subscription closed");
                    return;
                }
            }

            match self.replace(&mut stopping).await {
                Some(next) => failures = next,
                None => return,
            }
        }
    }

    /// Install a new worker, retrying until one starts or `stop` is called.
    async fn replace(&self, stopping: &mut watch::Receiver<bool>) -> Option<FailureSubscription> {
        let mut attempt: u32 = 0;
        loop {
            if *stopping.borrow() {
                return None;
            }
            attempt += 1;

            match self.spawn_worker().await {
                Ok((worker, failures)) => {
                    // The previous worker already cleaned up on its failure path.
                    *self.current.lock() = worker;
                    let replacements = self.replacements.fetch_add(1, Ordering::SeqCst) + 1;
                    metric_inc!(SUPERVISOR_REPLACEMENTS);
                    info!(attempt, replacements, "Replacement worker connected");
                    return Some(failures);
                }
                Err(error) => {
                    error!(
                        attempt,
                        error = %error,
                        retry_in_ms = self.config.retry_interval.as_millis() as u64,
                        "Worker replacement failed"
                    );
                    tokio::select! {
                        _ = stopping.changed() => return None,
                        () = tokio::time::sleep(self.config.retry_interval) => {}
                    }
                }
            }
        }
    }

    async fn spawn_worker(
        &self,
    ) -> Result<(Arc<dyn SupervisedWorker>, FailureSubscription), SupervisorError> {
        let worker = self.factory.create().await?;
        let failures = worker.subscribe_failures();
        worker.start().await?;
        match worker.status() {
            WorkerStatus::Connected => Ok((worker, failures)),
            status => Err(SupervisorError::NotConnected(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_bus::{BrokerUrl, InMemoryBroker};
    use shared_types::testing::MockTxSubmitProvider;
    use shared_types::BincodeTxIdentifier;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;
    use tr_02_submission_worker::{TxSubmitWorker, WorkerConfig, WorkerError};

    struct BrokerWorkerFactory {
        broker: InMemoryBroker,
        provider: Arc<MockTxSubmitProvider>,
        created: Mutex<Vec<TxSubmitWorker>>,
        calls: AtomicUsize,
        fail_next: AtomicUsize,
    }

    impl BrokerWorkerFactory {
        fn new(broker: &InMemoryBroker) -> Arc<Self> {
            Arc::new(Self {
                broker: broker.clone(),
                provider: Arc::new(MockTxSubmitProvider::new()),
                created: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail_next: AtomicUsize::new(0),
            })
        }

        fn created(&self) -> Vec<TxSubmitWorker> {
            self.created.lock().clone()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WorkerFactory for BrokerWorkerFactory {
        async fn create(&self) -> Result<Arc<dyn SupervisedWorker>, SupervisorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let pending = self.fail_next.load(Ordering::SeqCst);
            if pending > 0 {
                self.fail_next.store(pending - 1, Ordering::SeqCst);
                return Err(SupervisorError::factory("discovery timed out"));
            }
            let worker = TxSubmitWorker::new(
                WorkerConfig::new(BrokerUrl::localhost())
                    .with_polling_cycle(Duration::from_millis(20)),
                Arc::new(self.broker.clone()),
                self.provider.clone(),
                Arc::new(BincodeTxIdentifier),
            );
            self.created.lock().push(worker.clone());
            Ok(Arc::new(worker))
        }
    }

    fn fast() -> SupervisorConfig {
        SupervisorConfig {
            retry_interval: Duration::from_millis(50),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn test_unhealthy_start_is_surfaced() {
        let broker = InMemoryBroker::new();
        let factory = BrokerWorkerFactory::new(&broker);
        factory.provider.set_healthy(false);

        let error = start_with_discovery(factory.clone(), fast())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            SupervisorError::Worker(WorkerError::Unhealthy)
        ));
        assert_eq!(broker.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_debug_shows_current_worker() {
        let broker = InMemoryBroker::new();
        let running = start_with_discovery(BrokerWorkerFactory::new(&broker), fast())
            .await
            .unwrap();

        let rendered = format!("{running:?}");

        assert!(rendered.starts_with("RunningWorker"));
        assert!(rendered.contains("Connected"));
        assert!(rendered.contains("replacements: 0"));
        running.stop().await;
    }

    #[tokio::test]
    async fn test_failure_installs_new_worker() {
        let broker = InMemoryBroker::new();
        let factory = BrokerWorkerFactory::new(&broker);
        let running = start_with_discovery(factory.clone(), fast()).await.unwrap();
        assert_eq!(running.status(), WorkerStatus::Connected);

        broker.close_channels_with_error("broker restarting");
        wait_until(|| running.replacements() == 1).await;

        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].status(), WorkerStatus::Idle);
        assert_eq!(created[1].status(), WorkerStatus::Connected);
        assert_eq!(running.status(), WorkerStatus::Connected);
        assert_eq!(broker.open_connections(), 1);

        running.stop().await;
    }

    #[tokio::test]
    async fn test_stop_reaches_replacement() {
        let broker = InMemoryBroker::new();
        let factory = BrokerWorkerFactory::new(&broker);
        let running = start_with_discovery(factory.clone(), fast()).await.unwrap();

        broker.close_channels_with_error("first");
        wait_until(|| running.replacements() == 1).await;
        broker.close_channels_with_error("second");
        wait_until(|| running.replacements() == 2).await;

        running.stop().await;
        running.stop().await;

        assert!(factory
            .created()
            .iter()
            .all(|worker| worker.status() == WorkerStatus::Idle));
        assert_eq!(broker.open_connections(), 0);
        assert_eq!(running.status(), WorkerStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_errors_retried_after_interval() {
        let broker = InMemoryBroker::new();
        let factory = BrokerWorkerFactory::new(&broker);
        let running = start_with_discovery(factory.clone(), fast()).await.unwrap();
        factory.fail_next.store(2, Ordering::SeqCst);
        let started = tokio::time::Instant::now();

        broker.close_channels_with_error("network partition");
        wait_until(|| running.replacements() == 1).await;

        assert_eq!(factory.calls(), 4);
        assert!(started.elapsed() >= Duration::from_millis(100));
        running.stop().await;
    }

    #[tokio::test]
    async fn test_unreachable_broker_retried_until_back() {
        let broker = InMemoryBroker::new();
        let factory = BrokerWorkerFactory::new(&broker);
        let running = start_with_discovery(factory.clone(), fast()).await.unwrap();

        broker.set_unreachable(true);
        broker.close_channels_with_error("node down");
        wait_until(|| factory.calls() >= 3).await;
        assert_eq!(running.replacements(), 0);

        broker.set_unreachable(false);
        wait_until(|| running.replacements() == 1).await;
        assert_eq!(running.status(), WorkerStatus::Connected);
        running.stop().await;
        assert_eq!(broker.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_retry_loop() {
        let broker = InMemoryBroker::new();
        let factory = BrokerWorkerFactory::new(&broker);
        let running = start_with_discovery(
            factory.clone(),
            SupervisorConfig {
                retry_interval: Duration::from_secs(3600),
            },
        )
        .await
        .unwrap();
        factory.fail_next.store(usize::MAX, Ordering::SeqCst);

        broker.close_channels_with_error("gone");
        wait_until(|| factory.calls() >= 2).await;

        timeout(Duration::from_secs(5), running.stop()).await.unwrap();
        assert_eq!(factory.calls(), 2);
        assert_eq!(broker.open_connections(), 0);
    }
}
