//! Volume usage metrics
//!
//! This module provides:
//! - The [`MetricsSource`] seam for instant queries against a time-series backend
//! - The [`MetricsPoller`] that turns two instant queries into a [`MetricsSample`]
//! - A Prometheus HTTP API implementation with bearer authentication

mod credentials;
mod poller;
mod prometheus;


pub use credentials::{BearerToken, TOKEN_ENV_VAR, TOKEN_FILE};
pub use poller::{
    label_selector, MetricsPoller, DEFAULT_CAPACITY_BYTES_METRIC, DEFAULT_USED_BYTES_METRIC,
};
pub use prometheus::{PrometheusClient, PrometheusClientConfig, DEFAULT_PROMETHEUS_URL};

use crate::error::MetricsError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use crate::models::MetricsSample;

/// One series of an instant vector
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Typed result of an instant query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Vector(Vec<VectorSample>),
    Scalar(f64),
    /// Range vectors are never expected from an instant selector; only the
    /// series count is kept for diagnostics.
    Matrix(usize),
    String(String),
}

impl QueryValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Vector(_) => "vector",
            Self::Scalar(_) => "scalar",
            Self::Matrix(_) => "matrix",
            Self::String(_) => "string",
        }
    }
}

/// Query result plus the advisory warnings the backend attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub value: QueryValue,
    pub warnings: Vec<String>,
}

impl QueryResponse {
    pub fn vector(samples: Vec<VectorSample>) -> Self {
        Self {
            value: QueryValue::Vector(samples),
            warnings: Vec::new(),
        }
    }
}

/// Trait for time-series backends that answer instant queries
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `selector` at instant `at`
    async fn query(&self, selector: &str, at: DateTime<Utc>) -> Result<QueryResponse, MetricsError>;
}
