//! # Acceptance Scenarios
//!
//! A. Empty queue in serial mode keeps polling without creating replies
//! B. Successful submission produces one empty reply and drains the queue
//! C. Retryable failures are redelivered and never answered
//! D. Channel loss moves the worker to `Error` then `Idle`, notifying once
//! E. Discovery recovers from failed lookups within its time budget

#[cfg(test)]
mod tests {
    use crate::integration::support::{eventually, fast_serial, worker};
    use shared_bus::{BrokerError, BrokerUrl, InMemoryBroker};
    use shared_types::testing::{signed_tx, MockTxSubmitProvider};
    use shared_types::{
        FailureKind, ServiceLocation, SubmissionFailure, WorkerStatus, TX_SUBMISSION_QUEUE,
    };
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;
    use tr_01_service_discovery::testing::ScriptedSrvLookup;
    use tr_01_service_discovery::{BackoffConfig, DnsResolver, ServiceResolver, SrvRecord};
    use tr_02_submission_worker::WorkerConfig;

    // =========================================================================
    // SCENARIO A: IDLE POLLING
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn scenario_a_empty_queue_polls_without_replies() {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(MockTxSubmitProvider::new());
        let worker = worker(
            &broker,
            provider.clone(),
            WorkerConfig::new(BrokerUrl::localhost()).with_polling_cycle(Duration::from_millis(500)),
        );

        worker.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(broker.get_count() >= 3, "polls: {}", broker.get_count());
        assert_eq!(worker.messages_handled(), 0);
        assert_eq!(provider.submit_count(), 0);
        assert_eq!(worker.status(), WorkerStatus::Connected);
        assert_eq!(broker.queue_names(), vec![TX_SUBMISSION_QUEUE.to_string()]);
        worker.stop().await;
    }

    // =========================================================================
    // SCENARIO B: SUCCESS REPLY
    // =========================================================================

    #[tokio::test]
    async fn scenario_b_success_replies_once_and_drains_queue() {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(MockTxSubmitProvider::new());
        let worker = worker(&broker, provider.clone(), fast_serial());
        let tx = signed_tx(b"scenario b");
        let reply_queue = tx.id().to_hex();
        broker.enqueue(TX_SUBMISSION_QUEUE, &tx.to_bytes());

        worker.start().await.unwrap();
        eventually(Duration::from_secs(5), || {
            !broker.published(&reply_queue).is_empty()
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(broker.published(&reply_queue), vec![Vec::<u8>::new()]);
        assert_eq!(broker.queue_len(TX_SUBMISSION_QUEUE), 0);
        assert_eq!(broker.unacked_count(), 0);
        assert_eq!(provider.submitted(), vec![tx.to_bytes()]);
        worker.stop().await;
    }

    // =========================================================================
    // SCENARIO C: RETRYABLE REDELIVERY
    // =========================================================================

    #[tokio::test]
    async fn scenario_c_retryable_failure_is_redelivered_without_reply() {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(MockTxSubmitProvider::failing(SubmissionFailure::new(
            FailureKind::Timeout,
            "node did not answer",
        )));
        let worker = worker(&broker, provider.clone(), fast_serial());
        let tx = signed_tx(b"scenario c");
        broker.enqueue(TX_SUBMISSION_QUEUE, &tx.to_bytes());

        worker.start().await.unwrap();
        eventually(Duration::from_secs(5), || broker.requeue_count() >= 2).await;
        worker.stop().await;

        assert!(provider.submit_count() >= 3);
        assert!(provider.submitted().iter().all(|raw| *raw == tx.to_bytes()));
        assert!(broker.published(&tx.id().to_hex()).is_empty());
        assert!(!broker.has_queue(&tx.id().to_hex()));
        assert_eq!(broker.queue_len(TX_SUBMISSION_QUEUE), 1);
    }

    // =========================================================================
    // SCENARIO D: CHANNEL LOSS
    // =========================================================================

    #[tokio::test]
    async fn scenario_d_channel_close_notifies_exactly_once() {
        let broker = InMemoryBroker::new();
        let worker = worker(&broker, Arc::new(MockTxSubmitProvider::new()), fast_serial());
        let failures = worker.subscribe_failures();
        worker.start().await.unwrap();
        let mut transitions = worker.subscribe_status();

        broker.close_channels_with_error("CHANNEL_ERROR - forced");

        let error = timeout(Duration::from_secs(5), failures.recv())
            .await
            .unwrap();
        assert!(matches!(error, Some(BrokerError::ChannelClosed(_))));
        assert_eq!(transitions.recv().await.unwrap(), WorkerStatus::Error);
        assert_eq!(transitions.recv().await.unwrap(), WorkerStatus::Idle);
        assert_eq!(worker.status(), WorkerStatus::Idle);

        // A second subscriber never hears about the same failure again.
        let again = worker.subscribe_failures();
        broker.close_channels_with_error("late");
        assert!(timeout(Duration::from_millis(200), again.recv()).await.is_err());
        assert_eq!(broker.open_connections(), 0);
    }

    // =========================================================================
    // SCENARIO E: DISCOVERY BACKOFF
    // =========================================================================

    #[tokio::test]
    async fn scenario_e_discovery_recovers_within_budget() {
        let lookup = Arc::new(ScriptedSrvLookup::new());
        lookup.push_error("SERVFAIL");
        lookup.push_error("NXDOMAIN");
        lookup.push_records(vec![SrvRecord::new("rabbitmq-0.mq.svc.", 5672, 1, 10)]);
        let budget = Duration::from_millis(1000);
        let resolver = DnsResolver::new(lookup.clone(), BackoffConfig::new(1.1, budget));

        let started = Instant::now();
        let location = resolver.resolve("_amqp._tcp.mq.svc").await.unwrap();

        assert_eq!(location, ServiceLocation::new("rabbitmq-0.mq.svc", 5672));
        assert_eq!(lookup.calls(), 3);
        assert!(started.elapsed() < budget);
    }
}
