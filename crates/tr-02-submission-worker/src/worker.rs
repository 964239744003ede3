//! # Worker Lifecycle
//!
//! `TxSubmitWorker` owns one broker connection and one channel for its whole
//! life. After the connection ends (failure or `stop`) the instance is done;
//! supervisors build a fresh worker instead of restarting this one.

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::events::{FailureSlot, FailureSubscription};
use crate::handler::MessageHandler;
use parking_lot::Mutex;
use shared_bus::{
    BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, CloseSignal, DeliveryStream,
};
use shared_types::{TxIdentifier, TxSubmitProvider, WorkerStatus, TX_SUBMISSION_QUEUE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Capacity of the status transition channel.
const STATUS_CHANNEL_CAPACITY: usize = 32;

/// Resources held while connected.
struct Session {
    connection: Arc<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
    consumer_tag: Option<String>,
    shutdown: watch::Sender<bool>,
    intake: JoinHandle<()>,
}

struct WorkerInner {
    config: WorkerConfig,
    connector: Arc<dyn BrokerConnector>,
    provider: Arc<dyn TxSubmitProvider>,
    handler: Arc<MessageHandler>,
    status: Mutex<WorkerStatus>,
    transitions: broadcast::Sender<WorkerStatus>,
    failed: AtomicBool,
    failures: FailureSlot,
    session: tokio::sync::Mutex<Option<Session>>,
}

/// Consumes the submission queue and forwards transactions upstream.
///
/// Cloning yields another handle to the same worker.
#[derive(Clone)]
pub struct TxSubmitWorker {
    inner: Arc<WorkerInner>,
}

impl TxSubmitWorker {
    /// Create an idle worker.
    pub fn new(
        config: WorkerConfig,
        connector: Arc<dyn BrokerConnector>,
        provider: Arc<dyn TxSubmitProvider>,
        identifier: Arc<dyn TxIdentifier>,
    ) -> Self {
        let (transitions, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let handler = Arc::new(MessageHandler::new(Arc::clone(&provider), identifier));
        Self {
            inner: Arc::new(WorkerInner {
                config,
                connector,
                provider,
                handler,
                status: Mutex::new(WorkerStatus::Idle),
                transitions,
                failed: AtomicBool::new(false),
                failures: FailureSlot::default(),
                session: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        *self.inner.status.lock()
    }

    /// Every status change from now on.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<WorkerStatus> {
        self.inner.transitions.subscribe()
    }

    /// Subscribe to the connection-failure notification, replacing any
    /// previous subscription.
    pub fn subscribe_failures(&self) -> FailureSubscription {
        self.inner.failures.subscribe()
    }

    /// Messages taken off the queue so far.
    #[must_use]
    pub fn messages_handled(&self) -> u64 {
        self.inner.handler.handled()
    }

    /// The worker's configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Check upstream health, connect and begin consuming.
    ///
    /// Only an unhealthy upstream (or a second `start`) is reported here.
    /// Broker setup failures go through the failure path: the worker ends
    /// `Idle` and the failure subscriber is notified.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let mut slot = self.inner.session.lock().await;
        if slot.is_some() || self.inner.failed.load(Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }

        let health = self.inner.provider.health_check().await;
        if !health.ok {
            warn!("Upstream provider unhealthy, not starting worker");
            return Err(WorkerError::Unhealthy);
        }

        self.inner.set_status(WorkerStatus::Connecting);
        info!(
            broker = %self.inner.config.broker_url,
            parallel = self.inner.config.parallel,
            "Starting submission worker"
        );

        match Arc::clone(&self.inner).open_session().await {
            Ok(session) => {
                *slot = Some(session);
                self.inner.mark_connected();
                drop(slot);
                Ok(())
            }
            Err(error) => {
                drop(slot);
                Arc::clone(&self.inner).connection_failed(error).await;
                Ok(())
            }
        }
    }

    /// Stop intake, drain in-flight messages and disconnect.
    ///
    /// Idempotent; cleanup errors are logged, never returned.
    pub async fn stop(&self) {
        self.inner.stop_session().await;
    }
}

impl WorkerInner {
    fn set_status(&self, next: WorkerStatus) {
        let mut status = self.status.lock();
        self.transition(&mut status, next);
    }

    fn transition(&self, status: &mut WorkerStatus, next: WorkerStatus) {
        if *status != next {
            debug!(from = %*status, to = %next, "Worker status changed");
            *status = next;
            let _ = self.transitions.send(next);
        }
    }

    /// `Connecting -> Connected`, unless a failure got there first.
    fn mark_connected(&self) {
        let mut status = self.status.lock();
        if !self.failed.load(Ordering::SeqCst) && *status == WorkerStatus::Connecting {
            self.transition(&mut status, WorkerStatus::Connected);
            info!(queue = TX_SUBMISSION_QUEUE, "Submission worker connected");
        }
    }

    async fn open_session(self: Arc<Self>) -> Result<Session, BrokerError> {
        let connection = self.connector.connect(&self.config.broker_url).await?;
        match Arc::clone(&self).setup(Arc::clone(&connection)).await {
            Ok(session) => Ok(session),
            Err(error) => {
                if let Err(close_error) = connection.close().await {
                    debug!(error = %close_error, "Failed to close connection after setup error");
                }
                Err(error)
            }
        }
    }

    async fn setup(
        self: Arc<Self>,
        connection: Arc<dyn BrokerConnection>,
    ) -> Result<Session, BrokerError> {
        let channel = connection.create_channel().await?;
        channel.declare_queue(TX_SUBMISSION_QUEUE).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (intake, consumer_tag) = if self.config.parallel {
            channel.set_prefetch(self.config.parallel_txs).await?;
            let stream = channel.consume(TX_SUBMISSION_QUEUE).await?;
            let tag = stream.consumer_tag().to_string();
            let intake = tokio::spawn(Arc::clone(&self).run_consumer(
                Arc::clone(&channel),
                stream,
                shutdown_rx,
            ));
            (intake, Some(tag))
        } else {
            let intake =
                tokio::spawn(Arc::clone(&self).run_poller(Arc::clone(&channel), shutdown_rx));
            (intake, None)
        };

        tokio::spawn(Arc::clone(&self).watch_close(
            connection.close_signal(),
            channel.close_signal(),
        ));

        Ok(Session {
            connection,
            channel,
            consumer_tag,
            shutdown,
            intake,
        })
    }

    /// Parallel mode: one task per pushed delivery, bounded by prefetch.
    async fn run_consumer(
        self: Arc<Self>,
        channel: Arc<dyn BrokerChannel>,
        mut stream: DeliveryStream,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                delivery = stream.next() => match delivery {
                    Some(delivery) => {
                        let handler = Arc::clone(&self.handler);
                        let channel = Arc::clone(&channel);
                        handlers.spawn(async move {
                            handler.handle(channel.as_ref(), delivery).await;
                        });
                    }
                    None => break,
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(join_error) = joined {
                        warn!(error = %join_error, "Message handler task failed");
                    }
                }
            }
        }

        while let Some(joined) = handlers.join_next().await {
            if let Err(join_error) = joined {
                warn!(error = %join_error, "Message handler task failed");
            }
        }
        debug!("Consumer intake stopped");
    }

    /// Serial mode: one message at a time.
    async fn run_poller(
        self: Arc<Self>,
        channel: Arc<dyn BrokerChannel>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match channel.get(TX_SUBMISSION_QUEUE).await {
                Ok(Some(delivery)) => {
                    self.handler.handle(channel.as_ref(), delivery).await;
                    // A requeued message is at the head of the queue again.
                    tokio::task::yield_now().await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        () = tokio::time::sleep(self.config.polling_cycle) => {}
                    }
                }
                Err(error) => {
                    if !*shutdown.borrow() {
                        warn!(error = %error, "Polling the submission queue failed");
                        tokio::spawn(Arc::clone(&self).connection_failed(error));
                    }
                    break;
                }
            }
        }
        debug!("Polling intake stopped");
    }

    async fn watch_close(self: Arc<Self>, mut connection: CloseSignal, mut channel: CloseSignal) {
        let closed = tokio::select! {
            error = connection.closed() => error,
            error = channel.closed() => error,
        };
        if let Some(error) = closed {
            self.connection_failed(error).await;
        }
    }

    /// Log, mark `Error`, clean up, then notify the failure subscriber once.
    async fn connection_failed(self: Arc<Self>, error: BrokerError) {
        {
            let mut status = self.status.lock();
            if self.failed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.transition(&mut status, WorkerStatus::Error);
        }
        error!(error = %error, "Broker connection failed");

        self.stop_session().await;

        if !self.failures.emit(error) {
            debug!("No failure subscriber attached");
        }
    }

    async fn stop_session(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            debug!("Stopping submission worker");

            if let Some(tag) = &session.consumer_tag {
                if let Err(error) = session.channel.cancel(tag).await {
                    warn!(consumer_tag = %tag, error = %error, "Failed to cancel consumer");
                }
            }
            let _ = session.shutdown.send(true);

            if let Err(join_error) = session.intake.await {
                warn!(error = %join_error, "Intake task failed");
            }
            if let Err(error) = session.channel.close().await {
                warn!(error = %error, "Failed to close channel");
            }
            if let Err(error) = session.connection.close().await {
                warn!(error = %error, "Failed to close connection");
            }
            info!("Submission worker stopped");
        }
        self.set_status(WorkerStatus::Idle);
    }
}
