//! Volume expander library
//!
//! This crate provides the core functionality for:
//! - Resolving per-claim autoscaling policy from annotations
//! - Polling volume usage from Prometheus
//! - Planning capacity growth
//! - Disrupting workloads so pending resizes complete
//! - Running one reconciliation pass per claim against Kubernetes
//! - Health checks and observability

pub mod disruption;
pub mod error;
pub mod health;
pub mod k8s;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod planner;
pub mod policy;
pub mod quantity;
pub mod reconcile;

pub use error::{
    ConfigParseError, ControlPlaneError, DurationError, MetricsError, QuantityError,
    ReconcileError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExpanderMetrics, StructuredLogger};
pub use policy::{AutoscalePolicy, PolicyDefaults, PolicyResolver};
pub use quantity::{Quantity, QuantityFormat};
pub use reconcile::{PassOutcome, PassResult, Reconciler, ReconcilerBuilder};
