//! Prometheus metrics for Tx-Relay components.
//!
//! All metrics follow the naming convention: `tr_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

/// `outcome` label: message acknowledged after success or a fatal failure.
pub const OUTCOME_ACKED: &str = "acked";
/// `outcome` label: message nacked and requeued after a retryable failure.
pub const OUTCOME_REQUEUED: &str = "requeued";
/// `outcome` label: ack or nack itself failed.
pub const OUTCOME_REJECTED: &str = "rejected";
/// `outcome` label: payload could not be identified.
pub const OUTCOME_MALFORMED: &str = "malformed";

/// `outcome` label: SRV lookup produced a location.
pub const LOOKUP_RESOLVED: &str = "resolved";
/// `outcome` label: one SRV lookup attempt failed.
pub const LOOKUP_FAILED: &str = "failed";
/// `outcome` label: lookup budget exhausted.
pub const LOOKUP_TIMEOUT: &str = "timeout";

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SUBMISSION WORKER METRICS
    // =========================================================================

    /// Messages taken off the submission queue
    pub static ref WORKER_MESSAGES_RECEIVED: Counter = Counter::new(
        "tr_worker_messages_received_total",
        "Total messages received from the submission queue"
    ).expect("metric creation failed");

    /// Per-message outcome
    pub static ref WORKER_MESSAGE_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("tr_worker_message_outcomes_total", "Message handling outcomes"),
        &["outcome"]  // acked, requeued, rejected, malformed
    ).expect("metric creation failed");

    /// Replies published to per-transaction queues
    pub static ref WORKER_REPLIES_PUBLISHED: Counter = Counter::new(
        "tr_worker_replies_published_total",
        "Total replies published to reply queues"
    ).expect("metric creation failed");

    /// Replies that could not be published
    pub static ref WORKER_REPLY_FAILURES: Counter = Counter::new(
        "tr_worker_reply_failures_total",
        "Total replies that failed to publish"
    ).expect("metric creation failed");

    // =========================================================================
    // SUPERVISOR METRICS
    // =========================================================================

    /// Workers replaced after a connection failure
    pub static ref SUPERVISOR_REPLACEMENTS: Counter = Counter::new(
        "tr_supervisor_worker_replacements_total",
        "Total workers replaced after a connection failure"
    ).expect("metric creation failed");

    // =========================================================================
    // DISCOVERY METRICS
    // =========================================================================

    /// SRV lookups by outcome
    pub static ref DISCOVERY_LOOKUPS: CounterVec = CounterVec::new(
        Opts::new("tr_discovery_lookups_total", "SRV lookups by outcome"),
        &["outcome"]  // resolved, failed, timeout
    ).expect("metric creation failed");
}

/// Handle returned once metrics are registered.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Worker
        Box::new(WORKER_MESSAGES_RECEIVED.clone()),
        Box::new(WORKER_MESSAGE_OUTCOMES.clone()),
        Box::new(WORKER_REPLIES_PUBLISHED.clone()),
        Box::new(WORKER_REPLY_FAILURES.clone()),
        // Supervisor
        Box::new(SUPERVISOR_REPLACEMENTS.clone()),
        // Discovery
        Box::new(DISCOVERY_LOOKUPS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
