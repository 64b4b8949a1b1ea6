//! Error types for the volume expander
//!
//! Every failure is scoped to a single pass over a single claim. Nothing here
//! is fatal to the process: callers report errors through events and logs and
//! let the next scheduled pass retry.

use crate::models::ClaimKey;
use thiserror::Error;

/// Boxed error used at collaborator boundaries so adapters can carry their
/// native error types (kube, reqwest) without leaking them into the core.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A quantity string could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {input:?}")]
    InvalidNumber { input: String },

    #[error("unknown suffix {suffix:?} in quantity {input:?}")]
    UnknownSuffix { input: String, suffix: String },
}

/// A duration string could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {input:?}")]
    Invalid { input: String },

    #[error("missing unit in duration {input:?}")]
    MissingUnit { input: String },

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { input: String, unit: String },

    #[error("duration {input:?} must be positive")]
    NotPositive { input: String },
}

/// An annotation value was rejected by the policy resolver.
///
/// Never propagated to callers: the resolver logs it and falls back to the
/// default for that tunable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigParseError {
    #[error("unable to parse {key}={value:?} as an integer")]
    NotAnInteger { key: String, value: String },

    #[error("{key}={value} is out of range: {reason}")]
    OutOfRange {
        key: String,
        value: i64,
        reason: &'static str,
    },

    #[error("unable to parse {key}={value:?} as a duration: {source}")]
    Duration {
        key: String,
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("unable to parse {key}={value:?} as a quantity: {source}")]
    Quantity {
        key: String,
        value: String,
        #[source]
        source: QuantityError,
    },
}

impl ConfigParseError {
    /// Annotation key the rejected value came from
    pub fn key(&self) -> &str {
        match self {
            Self::NotAnInteger { key, .. }
            | Self::OutOfRange { key, .. }
            | Self::Duration { key, .. }
            | Self::Quantity { key, .. } => key,
        }
    }
}

/// Failures talking to the metrics source
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Transport, authentication or server-side failure. Retryable.
    #[error("metrics source unavailable: {reason}")]
    Unavailable {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The query returned something the poller cannot act on safely
    /// (several series, a non-vector result, a non-finite value).
    #[error("unexpected metrics result for {query}: {reason}")]
    Shape { query: String, reason: String },
}

impl MetricsError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn unavailable_with(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn shape(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Shape {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// True for transport/auth failures, false for shape errors
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A control-plane call (get/update/list/delete) failed
#[derive(Error, Debug)]
#[error("{operation} failed: {source}")]
pub struct ControlPlaneError {
    pub operation: &'static str,
    #[source]
    pub source: BoxError,
}

impl ControlPlaneError {
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Errors that end a reconciliation pass without an explicit requeue.
///
/// The scheduling mechanism that invoked the pass owns the retry policy for
/// these.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("unable to fetch claim {key}: {source}")]
    Fetch {
        key: ClaimKey,
        #[source]
        source: ControlPlaneError,
    },

    #[error("unable to update requested capacity of claim {key}: {source}")]
    Update {
        key: ClaimKey,
        #[source]
        source: ControlPlaneError,
    },

    #[error("unable to poll metrics for claim {key}: {source}")]
    Metrics {
        key: ClaimKey,
        #[source]
        source: MetricsError,
    },
}

impl ReconcileError {
    /// Short label used for error metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Update { .. } => "update",
            Self::Metrics { .. } => "metrics_shape",
        }
    }
}
