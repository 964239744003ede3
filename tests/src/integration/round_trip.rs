//! # Client ⇄ Worker Round Trips
//!
//! The correlated client and the worker share nothing but the broker and the
//! transaction identifier. These tests check that every caller gets its own
//! outcome back, in both consumption modes.

#[cfg(test)]
mod tests {
    use crate::integration::support::{eventually, fast_serial, worker};
    use futures::future::join_all;
    use shared_bus::{BrokerUrl, InMemoryBroker};
    use shared_types::testing::{signed_tx, MockTxSubmitProvider};
    use shared_types::{
        BincodeTxIdentifier, FailureKind, SubmissionFailure, TxSubmitProvider, TX_SUBMISSION_QUEUE,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tr_02_submission_worker::WorkerConfig;
    use tr_03_submit_client::BrokerTxSubmitProvider;

    async fn client(broker: &InMemoryBroker) -> Arc<BrokerTxSubmitProvider> {
        Arc::new(
            BrokerTxSubmitProvider::connect(
                broker,
                &BrokerUrl::localhost(),
                Arc::new(BincodeTxIdentifier),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_serial_round_trip_success_and_fatal() {
        let broker = InMemoryBroker::new();
        let upstream = Arc::new(MockTxSubmitProvider::new());
        let rejected = SubmissionFailure::new(FailureKind::AlreadyInLedger, "inputs spent");
        upstream.push_response(Ok(()));
        upstream.push_response(Err(rejected.clone()));
        let worker = worker(&broker, upstream.clone(), fast_serial());
        worker.start().await.unwrap();
        let client = client(&broker).await;

        let first = timeout(
            Duration::from_secs(5),
            client.submit_tx(&signed_tx(b"first").to_bytes()),
        )
        .await
        .unwrap();
        let second = timeout(
            Duration::from_secs(5),
            client.submit_tx(&signed_tx(b"second").to_bytes()),
        )
        .await
        .unwrap();

        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(rejected));
        assert_eq!(upstream.submit_count(), 2);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_parallel_worker_answers_each_caller() {
        let broker = InMemoryBroker::new();
        let upstream = Arc::new(MockTxSubmitProvider::new());
        upstream.set_delay(Duration::from_millis(10));
        let worker = worker(
            &broker,
            upstream.clone(),
            WorkerConfig::new(BrokerUrl::localhost()).parallel(3),
        );
        worker.start().await.unwrap();
        let client = client(&broker).await;

        let calls = (0..9u8).map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.submit_tx(&signed_tx(&[b'p', i]).to_bytes()).await })
        });
        let results = timeout(Duration::from_secs(10), join_all(calls))
            .await
            .unwrap();

        for result in results {
            assert_eq!(result.unwrap(), Ok(()));
        }
        assert_eq!(upstream.submit_count(), 9);
        assert!(upstream.max_in_flight() <= 3);
        assert_eq!(broker.unacked_count(), 0);
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_retryable_then_success_reaches_client_once() {
        let broker = InMemoryBroker::new();
        let upstream = Arc::new(MockTxSubmitProvider::new());
        upstream.push_response(Err(SubmissionFailure::unhealthy()));
        upstream.push_response(Err(SubmissionFailure::connection("socket closed")));
        let worker = worker(&broker, upstream.clone(), fast_serial());
        worker.start().await.unwrap();
        let client = client(&broker).await;
        let tx = signed_tx(b"eventually");

        let result = timeout(Duration::from_secs(5), client.submit_tx(&tx.to_bytes()))
            .await
            .unwrap();

        assert_eq!(result, Ok(()));
        assert_eq!(upstream.submit_count(), 3);
        assert_eq!(broker.requeue_count(), 2);
        assert!(!broker.has_queue(&tx.id().to_hex()));
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_foreign_garbage_does_not_disturb_clients() {
        let broker = InMemoryBroker::new();
        let upstream = Arc::new(MockTxSubmitProvider::new());
        let worker = worker(&broker, upstream.clone(), fast_serial());
        broker.enqueue(TX_SUBMISSION_QUEUE, b"\xffnot-bincode");
        worker.start().await.unwrap();
        eventually(Duration::from_secs(5), || worker.messages_handled() == 1).await;

        let client = client(&broker).await;
        let result = timeout(
            Duration::from_secs(5),
            client.submit_tx(&signed_tx(b"after garbage").to_bytes()),
        )
        .await
        .unwrap();

        assert_eq!(result, Ok(()));
        assert_eq!(upstream.submit_count(), 1);
        assert_eq!(worker.messages_handled(), 2);
        worker.stop().await;
    }
}
