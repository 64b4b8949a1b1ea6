//! Reconciliation of storage claims
//!
//! One pass reads a claim, resolves its policy, polls usage, and either
//! grows the claim or, while a previous growth is still pending, removes the
//! workloads that keep the old volume mounted. The caller schedules passes;
//! the pass only says when it wants the next one.

mod machine;


pub use machine::{Reconciler, ReconcilerBuilder, Step};

use crate::error::ControlPlaneError;
use crate::models::{ClaimKey, StorageClaim, WorkloadRef};
use crate::quantity::Quantity;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Control-plane operations a pass needs
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Read a claim; `Ok(None)` when it no longer exists
    async fn get(&self, key: &ClaimKey) -> Result<Option<StorageClaim>, ControlPlaneError>;

    /// Persist a new requested capacity
    async fn update(&self, claim: &StorageClaim) -> Result<(), ControlPlaneError>;

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadRef>, ControlPlaneError>;

    async fn delete_workload(&self, workload: &WorkloadRef) -> Result<(), ControlPlaneError>;
}

/// Receives user-facing events about a claim.
///
/// Publishing is best effort; implementations swallow their own failures.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, claim: &StorageClaim, event: ClaimEvent);
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Event reasons
pub mod reasons {
    pub const EXPANSION_REQUESTED: &str = "VolumeExpansionRequested";
    pub const WORKLOAD_DISRUPTED: &str = "WorkloadDisrupted";
    pub const UNABLE_TO_EXPAND: &str = "UnableToExpand";
    pub const UNABLE_TO_DISRUPT: &str = "UnableToDisrupt";
}

/// An event attached to a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEvent {
    pub kind: EventKind,
    pub reason: &'static str,
    pub action: &'static str,
    pub note: String,
}

impl ClaimEvent {
    pub fn expansion_requested(from: &Quantity, to: &Quantity) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reasons::EXPANSION_REQUESTED,
            action: "Expand",
            note: format!("Requested capacity raised from {} to {}", from, to),
        }
    }

    pub fn workload_disrupted(workload: &WorkloadRef) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reasons::WORKLOAD_DISRUPTED,
            action: "Disrupt",
            note: format!(
                "Deleted pod {} so the resized volume is remounted",
                workload.name
            ),
        }
    }

    pub fn unable_to_expand(error: &dyn fmt::Display) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reasons::UNABLE_TO_EXPAND,
            action: "Expand",
            note: error.to_string(),
        }
    }

    pub fn unable_to_disrupt(error: &dyn fmt::Display) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reasons::UNABLE_TO_DISRUPT,
            action: "Disrupt",
            note: error.to_string(),
        }
    }
}

/// Event sink that only writes log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, claim: &StorageClaim, event: ClaimEvent) {
        match event.kind {
            EventKind::Normal => info!(
                claim = %claim.key,
                reason = event.reason,
                note = %event.note,
                "Claim event"
            ),
            EventKind::Warning => warn!(
                claim = %claim.key,
                reason = event.reason,
                note = %event.note,
                "Claim event"
            ),
        }
    }
}

/// What a successful pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassResult {
    /// The claim no longer exists
    Gone,
    /// The metrics source has no series for the claim yet
    MetricsPending,
    /// The metrics source could not be reached
    MetricsUnavailable,
    /// Nothing to do
    Steady,
    Expanded { from: Quantity, to: Quantity },
    /// A resize is pending; `failed` removals are retried on the next pass.
    /// A failed workload listing reports zero for both.
    Disrupted { deleted: usize, failed: usize },
}

impl PassResult {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            PassResult::Gone => "gone",
            PassResult::MetricsPending => "metrics_pending",
            PassResult::MetricsUnavailable => "metrics_unavailable",
            PassResult::Steady => "steady",
            PassResult::Expanded { .. } => "expanded",
            PassResult::Disrupted { .. } => "disrupted",
        }
    }
}

/// Result of a pass and when to run the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub result: PassResult,
    /// `None` means do not schedule; wait for the claim to change
    pub requeue_after: Option<Duration>,
}

impl PassOutcome {
    pub fn done(result: PassResult) -> Self {
        Self {
            result,
            requeue_after: None,
        }
    }

    pub fn requeue(result: PassResult, after: Duration) -> Self {
        Self {
            result,
            requeue_after: Some(after),
        }
    }
}
