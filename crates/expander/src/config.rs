//! Operator configuration

use anyhow::{bail, Context, Result};
use expander_lib::metrics::{
    PrometheusClientConfig, DEFAULT_CAPACITY_BYTES_METRIC, DEFAULT_PROMETHEUS_URL,
    DEFAULT_USED_BYTES_METRIC, TOKEN_FILE,
};
use expander_lib::policy::{self, PolicyDefaults};
use expander_lib::quantity::Quantity;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Operator configuration, read from `EXPANDER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ExpanderConfig {
    /// Instance name reported in logs and events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Only watch claims in this namespace
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Prometheus API address
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Bearer token file, used when `TOKEN` is not set
    #[serde(default = "default_token_file")]
    pub token_file: String,

    #[serde(default = "default_true")]
    pub metrics_insecure_skip_verify: bool,

    #[serde(default = "default_request_timeout")]
    pub metrics_request_timeout_secs: u64,

    #[serde(default = "default_used_bytes_metric")]
    pub used_bytes_metric: String,

    #[serde(default = "default_capacity_bytes_metric")]
    pub capacity_bytes_metric: String,

    /// Delay before retrying a pass that failed
    #[serde(default = "default_error_requeue")]
    pub error_requeue_secs: u64,

    #[serde(default = "default_polling_interval")]
    pub default_polling_interval: String,

    #[serde(default = "default_expand_by_percent")]
    pub default_expand_by_percent: u32,

    #[serde(default = "default_expand_threshold_percent")]
    pub default_expand_threshold_percent: u32,

    /// Ceiling applied when a claim sets none; unbounded if unset
    #[serde(default)]
    pub default_expand_up_to: Option<String>,
}

fn default_instance() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "volume-expander".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_prometheus_url() -> String {
    std::env::var("PROMETHEUS_URL").unwrap_or_else(|_| DEFAULT_PROMETHEUS_URL.to_string())
}

fn default_token_file() -> String {
    TOKEN_FILE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_used_bytes_metric() -> String {
    DEFAULT_USED_BYTES_METRIC.to_string()
}

fn default_capacity_bytes_metric() -> String {
    DEFAULT_CAPACITY_BYTES_METRIC.to_string()
}

fn default_error_requeue() -> u64 {
    60
}

fn default_polling_interval() -> String {
    "30s".to_string()
}

fn default_expand_by_percent() -> u32 {
    policy::DEFAULT_GROWTH_PERCENT
}

fn default_expand_threshold_percent() -> u32 {
    policy::DEFAULT_THRESHOLD_PERCENT
}

impl ExpanderConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("EXPANDER"))
    }

    /// Load configuration from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("EXPANDER").source(Some(vars)))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid EXPANDER_* configuration")
    }

    /// Fallback policy handed to the resolver
    pub fn policy_defaults(&self) -> Result<PolicyDefaults> {
        let polling_interval = policy::parse_duration(&self.default_polling_interval)
            .with_context(|| {
                format!(
                    "Invalid default polling interval {:?}",
                    self.default_polling_interval
                )
            })?;

        if self.default_expand_by_percent < 1 {
            bail!("Default expand-by percent must be at least 1");
        }
        if !(1..=99).contains(&self.default_expand_threshold_percent) {
            bail!("Default expand threshold percent must be between 1 and 99");
        }

        let ceiling = match &self.default_expand_up_to {
            Some(raw) => raw
                .parse::<Quantity>()
                .with_context(|| format!("Invalid default expand-up-to {:?}", raw))?,
            None => Quantity::max(),
        };

        Ok(PolicyDefaults {
            polling_interval,
            growth_percent: self.default_expand_by_percent,
            threshold_percent: self.default_expand_threshold_percent,
            ceiling,
        })
    }

    pub fn prometheus_client_config(&self) -> PrometheusClientConfig {
        PrometheusClientConfig {
            address: self.prometheus_url.clone(),
            request_timeout: Duration::from_secs(self.metrics_request_timeout_secs),
            insecure_skip_verify: self.metrics_insecure_skip_verify,
            ..Default::default()
        }
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}
