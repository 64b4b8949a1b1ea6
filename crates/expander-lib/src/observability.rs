//! Observability infrastructure for the volume expander
//!
//! Provides:
//! - Prometheus metrics (pass outcomes, expansions, disruptions, latencies)
//! - Structured JSON logging of significant events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExpanderMetricsInner> = OnceLock::new();

struct ExpanderMetricsInner {
    passes: IntCounterVec,
    pass_errors: IntCounterVec,
    expansions: IntCounter,
    disruptions: IntCounterVec,
    pass_duration_seconds: Histogram,
    metrics_query_seconds: Histogram,
}

impl ExpanderMetricsInner {
    fn new() -> Self {
        Self {
            passes: register_int_counter_vec!(
                "volume_expander_passes_total",
                "Reconciliation passes that completed, by result",
                &["result"]
            )
            .expect("Failed to register passes_total"),

            pass_errors: register_int_counter_vec!(
                "volume_expander_pass_errors_total",
                "Reconciliation passes that ended with an error, by kind",
                &["kind"]
            )
            .expect("Failed to register pass_errors_total"),

            expansions: register_int_counter!(
                "volume_expander_expansions_total",
                "Capacity increases requested on claims"
            )
            .expect("Failed to register expansions_total"),

            disruptions: register_int_counter_vec!(
                "volume_expander_disruptions_total",
                "Workload removals attempted for pending resizes, by result",
                &["result"]
            )
            .expect("Failed to register disruptions_total"),

            pass_duration_seconds: register_histogram!(
                "volume_expander_pass_duration_seconds",
                "Time spent in one reconciliation pass",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_duration_seconds"),

            metrics_query_seconds: register_histogram!(
                "volume_expander_metrics_query_seconds",
                "Time spent in a single metrics query",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register metrics_query_seconds"),
        }
    }
}

/// Expander metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExpanderMetrics {
    _private: (),
}

impl Default for ExpanderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpanderMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExpanderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExpanderMetricsInner {
        GLOBAL_METRICS.get_or_init(ExpanderMetricsInner::new)
    }

    pub fn inc_pass(&self, result: &str) {
        self.inner().passes.with_label_values(&[result]).inc();
    }

    pub fn inc_pass_error(&self, kind: &str) {
        self.inner().pass_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_expansions(&self) {
        self.inner().expansions.inc();
    }

    pub fn inc_disruptions(&self, deleted: usize, failed: usize) {
        let inner = self.inner();
        inner
            .disruptions
            .with_label_values(&["deleted"])
            .inc_by(deleted as u64);
        inner
            .disruptions
            .with_label_values(&["failed"])
            .inc_by(failed as u64);
    }

    pub fn observe_pass_duration(&self, duration: Duration) {
        self.inner()
            .pass_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn observe_metrics_query_latency(&self, duration_secs: f64) {
        self.inner().metrics_query_seconds.observe(duration_secs);
    }
}

/// Structured logger for operator events
///
/// Emits one JSON record per significant event with a stable `event` field.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log operator startup
    pub fn log_startup(&self, version: &str, metrics_address: &str) {
        info!(
            event = "operator_started",
            instance = %self.instance,
            version = %version,
            metrics_address = %metrics_address,
            "Volume expander started"
        );
    }

    /// Log operator shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "operator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Volume expander shutting down"
        );
    }

    /// Log a requested capacity increase
    pub fn log_expansion(
        &self,
        namespace: &str,
        claim: &str,
        used_bytes: i64,
        capacity_bytes: i64,
        from: &str,
        to: &str,
    ) {
        info!(
            event = "expansion_requested",
            instance = %self.instance,
            namespace = %namespace,
            claim = %claim,
            used_bytes = used_bytes,
            capacity_bytes = capacity_bytes,
            from = %from,
            to = %to,
            "Requested larger volume"
        );
    }

    /// Log the outcome of a workload removal
    pub fn log_disruption(&self, namespace: &str, claim: &str, workload: &str, error: Option<&str>) {
        match error {
            None => info!(
                event = "workload_disrupted",
                instance = %self.instance,
                namespace = %namespace,
                claim = %claim,
                workload = %workload,
                "Removed workload so it remounts the resized volume"
            ),
            Some(error) => warn!(
                event = "workload_disruption_failed",
                instance = %self.instance,
                namespace = %namespace,
                claim = %claim,
                workload = %workload,
                error = %error,
                "Unable to remove workload"
            ),
        }
    }

    /// Log a pass that ended with an error
    pub fn log_pass_failed(&self, namespace: &str, claim: &str, kind: &str, error: &str) {
        warn!(
            event = "pass_failed",
            instance = %self.instance,
            namespace = %namespace,
            claim = %claim,
            kind = %kind,
            error = %error,
            "Reconciliation pass failed"
        );
    }
}
