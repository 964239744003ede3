//! Test doubles for the provider ports.
//!
//! Available with the `test-utils` feature flag.

use crate::entities::{HealthCheckResponse, SignedTransaction, Witness};
use crate::errors::SubmissionFailure;
use crate::provider::TxSubmitProvider;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Build a well-formed signed transaction whose body is `body`.
pub fn signed_tx(body: &[u8]) -> SignedTransaction {
    SignedTransaction {
        body: body.to_vec(),
        witnesses: vec![Witness {
            public_key: [7; 32],
            signature: [9; 64],
        }],
    }
}

/// A scriptable `TxSubmitProvider`.
///
/// Queued responses are returned in order; afterwards every call gets the
/// default response (success unless changed).
#[derive(Debug)]
pub struct MockTxSubmitProvider {
    healthy: AtomicBool,
    responses: Mutex<VecDeque<Result<(), SubmissionFailure>>>,
    default_response: Mutex<Result<(), SubmissionFailure>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    health_checks: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Duration>,
}

impl Default for MockTxSubmitProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTxSubmitProvider {
    /// Healthy provider that accepts everything immediately.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            responses: Mutex::new(VecDeque::new()),
            default_response: Mutex::new(Ok(())),
            submitted: Mutex::new(Vec::new()),
            health_checks: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Provider that always fails with `failure`.
    pub fn failing(failure: SubmissionFailure) -> Self {
        let provider = Self::new();
        provider.set_default_response(Err(failure));
        provider
    }

    /// Report healthy or not.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Queue one response.
    pub fn push_response(&self, response: Result<(), SubmissionFailure>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Response used once the queue is empty.
    pub fn set_default_response(&self, response: Result<(), SubmissionFailure>) {
        if let Ok(mut default_response) = self.default_response.lock() {
            *default_response = response;
        }
    }

    /// Make every submission take `delay`.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
    }

    /// Payloads submitted so far, in call order.
    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of `submit_tx` calls.
    pub fn submit_count(&self) -> usize {
        self.submitted.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Number of `health_check` calls.
    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `submit_tx` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxSubmitProvider for MockTxSubmitProvider {
    async fn health_check(&self) -> HealthCheckResponse {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        HealthCheckResponse {
            ok: self.healthy.load(Ordering::SeqCst),
        }
    }

    async fn submit_tx(&self, signed_transaction: &[u8]) -> Result<(), SubmissionFailure> {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(signed_transaction.to_vec());
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let queued = self.responses.lock().ok().and_then(|mut r| r.pop_front());
        let response = match queued {
            Some(response) => response,
            None => self
                .default_response
                .lock()
                .map(|r| r.clone())
                .unwrap_or(Ok(())),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}
