//! Health tracking for the operator's collaborators
//!
//! Each pass reports whether the metrics source and the control plane
//! answered. Repeated failures move a component from healthy to degraded to
//! unhealthy; a single success restores it. The HTTP probes read the
//! aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failures after which a component is reported unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 5;

/// Component names for health tracking
pub mod components {
    pub const CONTROLLER: &str = "controller";
    pub const METRICS_SOURCE: &str = "metrics_source";
    pub const CONTROL_PLANE: &str = "control_plane";
}

/// Ordered from best to worst, so the aggregate is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing, but not for long enough to be considered down
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    fn for_streak(failures: u32) -> Self {
        match failures {
            0 => ComponentStatus::Healthy,
            n if n < UNHEALTHY_AFTER_FAILURES => ComponentStatus::Degraded,
            _ => ComponentStatus::Unhealthy,
        }
    }

    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

/// Last known state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    /// Error from the most recent failure, cleared on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_success: None,
            updated_at: Utc::now(),
        }
    }

    fn succeeded(&mut self) {
        let now = Utc::now();
        self.consecutive_failures = 0;
        self.status = ComponentStatus::Healthy;
        self.message = None;
        self.last_success = Some(now);
        self.updated_at = now;
    }

    fn failed(&mut self, message: String) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.status = ComponentStatus::for_streak(self.consecutive_failures);
        self.message = Some(message);
        self.updated_at = Utc::now();
    }
}

/// Body of the liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of the readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    started: bool,
    components: BTreeMap<String, ComponentHealth>,
}

impl RegistryState {
    fn entry(&mut self, name: &str) -> &mut ComponentHealth {
        self.components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::new)
    }

    fn worst(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }

    fn down(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, c)| !c.status.is_operational())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Shared between the reconciler, the controller loop and the probes
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a component visible before its first report
    pub async fn register(&self, name: &str) {
        self.state.write().await.entry(name);
    }

    pub async fn record_success(&self, name: &str) {
        self.state.write().await.entry(name).succeeded();
    }

    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        self.state.write().await.entry(name).failed(message.into());
    }

    /// Flipped on once the controller runs, off again on shutdown
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.started = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.worst(),
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.started {
            return ReadinessResponse {
                ready: false,
                reason: Some("controller not running".to_string()),
            };
        }

        let down = state.down();
        if down.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("unhealthy: {}", down.join(", "))),
            }
        }
    }
}
