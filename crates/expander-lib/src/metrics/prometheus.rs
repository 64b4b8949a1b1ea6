//! Prometheus HTTP API client
//!
//! Evaluates instant queries through `GET /api/v1/query`, authenticating
//! with a bearer token. Connection behaviour (timeouts, keepalive, idle pool)
//! is configured once when the client is built.

use super::{BearerToken, MetricsSource, QueryResponse, QueryValue, VectorSample};
use crate::error::MetricsError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// In-cluster monitoring endpoint used when none is configured
pub const DEFAULT_PROMETHEUS_URL: &str = "https://prometheus-k8s.openshift-monitoring.svc:9092";

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusClientConfig {
    /// Base address of the Prometheus API
    pub address: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// TCP keepalive interval
    pub keepalive: Duration,
    /// How long idle pooled connections are kept
    pub idle_timeout: Duration,
    /// Maximum idle pooled connections per host
    pub max_idle_per_host: usize,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Accept any server certificate
    pub insecure_skip_verify: bool,
}

impl Default for PrometheusClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_PROMETHEUS_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 100,
            request_timeout: Duration::from_secs(30),
            insecure_skip_verify: true,
        }
    }
}

/// Prometheus-backed [`MetricsSource`]
pub struct PrometheusClient {
    client: reqwest::Client,
    query_url: Url,
    token: BearerToken,
}

impl PrometheusClient {
    /// Build a client; fails only on an invalid address or TLS setup
    pub fn new(config: PrometheusClientConfig, token: BearerToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Some(config.keepalive))
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .context("Failed to create HTTP client")?;

        let mut address = config.address.clone();
        if !address.ends_with('/') {
            address.push('/');
        }
        let query_url = Url::parse(&address)
            .and_then(|base| base.join("api/v1/query"))
            .with_context(|| format!("Invalid Prometheus address: {}", config.address))?;

        Ok(Self {
            client,
            query_url,
            token,
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query(&self, selector: &str, at: DateTime<Utc>) -> Result<QueryResponse, MetricsError> {
        let time = format!("{:.3}", at.timestamp_millis() as f64 / 1000.0);

        let mut request = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", selector), ("time", time.as_str())]);
        if !self.token.is_empty() {
            request = request.bearer_auth(self.token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetricsError::unavailable_with("query request failed", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| MetricsError::unavailable_with("failed to read query response", e))?;
        let parsed = serde_json::from_slice::<ApiResponse>(&body);

        if !status.is_success() {
            let reason = match parsed {
                Ok(ApiResponse {
                    error: Some(error),
                    error_type,
                    ..
                }) => format!(
                    "HTTP {} ({}): {}",
                    status,
                    error_type.unwrap_or_else(|| "unknown".to_string()),
                    error
                ),
                _ => format!("HTTP {}", status),
            };
            return Err(MetricsError::unavailable(reason));
        }

        let parsed = parsed
            .map_err(|e| MetricsError::shape(selector, format!("undecodable response: {e}")))?;

        if parsed.status != "success" {
            return Err(MetricsError::unavailable(format!(
                "query status {}: {}",
                parsed.status,
                parsed.error.unwrap_or_default()
            )));
        }

        let data = parsed
            .data
            .ok_or_else(|| MetricsError::shape(selector, "response has no data"))?;
        let value = decode_value(selector, data)?;

        debug!(query = %selector, result_type = value.type_name(), "Prometheus query answered");

        Ok(QueryResponse {
            value,
            warnings: parsed.warnings,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    data: Option<ApiData>,
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiVectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

fn decode_value(query: &str, data: ApiData) -> Result<QueryValue, MetricsError> {
    let undecodable = |e: serde_json::Error| {
        MetricsError::shape(query, format!("undecodable {} result: {e}", data.result_type))
    };

    match data.result_type.as_str() {
        "vector" => {
            let samples: Vec<ApiVectorSample> =
                serde_json::from_value(data.result.clone()).map_err(undecodable)?;
            samples
                .into_iter()
                .map(|s| {
                    Ok(VectorSample {
                        labels: s.metric,
                        value: parse_sample_value(query, &s.value.1)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(QueryValue::Vector)
        }
        "scalar" => {
            let (_, value): (f64, String) =
                serde_json::from_value(data.result.clone()).map_err(undecodable)?;
            Ok(QueryValue::Scalar(parse_sample_value(query, &value)?))
        }
        "matrix" => {
            let series: Vec<serde_json::Value> =
                serde_json::from_value(data.result.clone()).map_err(undecodable)?;
            Ok(QueryValue::Matrix(series.len()))
        }
        "string" => {
            let (_, value): (f64, String) =
                serde_json::from_value(data.result.clone()).map_err(undecodable)?;
            Ok(QueryValue::String(value))
        }
        other => Err(MetricsError::shape(
            query,
            format!("unknown result type {other}"),
        )),
    }
}

fn parse_sample_value(query: &str, raw: &str) -> Result<f64, MetricsError> {
    raw.parse::<f64>()
        .map_err(|_| MetricsError::shape(query, format!("unparsable sample value {raw:?}")))
}
