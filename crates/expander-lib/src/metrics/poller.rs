//! Used/capacity polling for a single claim

use super::{MetricsSource, QueryValue};
use crate::error::MetricsError;
use crate::models::{ClaimKey, MetricsSample};
use crate::observability::ExpanderMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Kubelet gauge of bytes used on a mounted volume
pub const DEFAULT_USED_BYTES_METRIC: &str = "kubelet_volume_stats_used_bytes";

/// Kubelet gauge of the filesystem size of a mounted volume
pub const DEFAULT_CAPACITY_BYTES_METRIC: &str = "kubelet_volume_stats_capacity_bytes";

/// Polls used and provisioned bytes of a claim.
///
/// A series that does not exist yet (the volume is not mounted anywhere, or
/// the kubelet has not been scraped) is reported as an unavailable sample,
/// never as an error.
pub struct MetricsPoller {
    source: Arc<dyn MetricsSource>,
    used_metric: String,
    capacity_metric: String,
    metrics: Option<ExpanderMetrics>,
}

impl MetricsPoller {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self {
            source,
            used_metric: DEFAULT_USED_BYTES_METRIC.to_string(),
            capacity_metric: DEFAULT_CAPACITY_BYTES_METRIC.to_string(),
            metrics: None,
        }
    }

    /// Override the metric names queried
    pub fn with_metric_names(
        mut self,
        used_metric: impl Into<String>,
        capacity_metric: impl Into<String>,
    ) -> Self {
        self.used_metric = used_metric.into();
        self.capacity_metric = capacity_metric.into();
        self
    }

    /// Record query latency
    pub fn with_metrics(mut self, metrics: ExpanderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Query used and capacity bytes for `key` at the current instant
    pub async fn poll(&self, key: &ClaimKey) -> Result<MetricsSample, MetricsError> {
        self.poll_at(key, Utc::now()).await
    }

    /// Query used and capacity bytes for `key` at instant `at`
    pub async fn poll_at(
        &self,
        key: &ClaimKey,
        at: DateTime<Utc>,
    ) -> Result<MetricsSample, MetricsError> {
        let Some(used) = self.query_bytes(&self.used_metric, key, at).await? else {
            debug!(claim = %key, metric = %self.used_metric, "Metrics not available yet");
            return Ok(MetricsSample::unavailable());
        };

        let Some(capacity) = self.query_bytes(&self.capacity_metric, key, at).await? else {
            debug!(claim = %key, metric = %self.capacity_metric, "Metrics not available yet");
            return Ok(MetricsSample::unavailable());
        };

        Ok(MetricsSample::new(used, capacity))
    }

    /// Run one query; `None` means the series has no data yet
    async fn query_bytes(
        &self,
        metric: &str,
        key: &ClaimKey,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, MetricsError> {
        let selector = label_selector(metric, key);

        let start = Instant::now();
        let response = self.source.query(&selector, at).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_metrics_query_latency(start.elapsed().as_secs_f64());
        }
        let response = response?;

        for warning in &response.warnings {
            info!(query = %selector, warning = %warning, "Metrics query returned a warning");
        }

        match response.value {
            QueryValue::Vector(samples) => match samples.as_slice() {
                [] => Ok(None),
                [sample] => {
                    debug!(query = %selector, value = sample.value, "Metrics query result");
                    to_bytes(&selector, sample.value).map(Some)
                }
                many => Err(MetricsError::shape(
                    selector,
                    format!("expected a single series, got {}", many.len()),
                )),
            },
            other => Err(MetricsError::shape(
                selector,
                format!("expected a vector result, got {}", other.type_name()),
            )),
        }
    }
}

/// Truncate a sample value to whole bytes
fn to_bytes(query: &str, value: f64) -> Result<i64, MetricsError> {
    if !value.is_finite() {
        return Err(MetricsError::shape(query, format!("non-finite value {value}")));
    }
    Ok(value.trunc() as i64)
}

/// Instant selector for `metric` scoped to one claim
pub fn label_selector(metric: &str, key: &ClaimKey) -> String {
    format!(
        "{}{{namespace=\"{}\",persistentvolumeclaim=\"{}\"}}",
        metric,
        escape_label_value(&key.namespace),
        escape_label_value(&key.name)
    )
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
