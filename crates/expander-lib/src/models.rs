//! Core data models for the volume expander

use crate::quantity::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a storage claim (namespace + name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimKey {
    pub namespace: String,
    pub name: String,
}

impl ClaimKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The managed storage-request entity.
///
/// Owned by the control plane; the expander only reads it and proposes a new
/// requested capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageClaim {
    pub key: ClaimKey,
    /// Object UID, used to attach events
    pub uid: Option<String>,
    /// Version the claim was read at, for optimistic concurrency on update
    pub resource_version: Option<String>,
    pub annotations: BTreeMap<String, String>,
    /// Size asked for in the claim spec
    pub requested: Quantity,
    /// Size the storage backend reports as provisioned, if bound
    pub provisioned: Option<Quantity>,
}

/// Result of one metrics poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// When false, `used_bytes` and `capacity_bytes` carry no meaning
    pub available: bool,
    pub used_bytes: i64,
    pub capacity_bytes: i64,
}

impl MetricsSample {
    /// The source has not emitted data for this claim yet
    pub fn unavailable() -> Self {
        Self {
            available: false,
            used_bytes: 0,
            capacity_bytes: 0,
        }
    }

    pub fn new(used_bytes: i64, capacity_bytes: i64) -> Self {
        Self {
            available: true,
            used_bytes,
            capacity_bytes,
        }
    }

    /// Usage ratio in percent, for logging only
    pub fn usage_percent(&self) -> Option<f64> {
        if !self.available || self.capacity_bytes == 0 {
            return None;
        }
        Some(self.used_bytes as f64 / self.capacity_bytes as f64 * 100.0)
    }
}

/// Lifecycle phase of a dependent workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    /// Maps a pod phase string; anything unrecognised is `Unknown`
    pub fn from_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Only live workloads are worth disrupting
    pub fn is_disruptable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A workload bound to claims through volume attachments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
    pub phase: WorkloadPhase,
    /// Names of the claims mounted as volumes
    pub claim_names: Vec<String>,
}

impl WorkloadRef {
    pub fn mounts(&self, claim_name: &str) -> bool {
        self.claim_names.iter().any(|c| c == claim_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_key_display() {
        assert_eq!(ClaimKey::new("prod", "pg-data").to_string(), "prod/pg-data");
    }

    #[test]
    fn test_usage_percent() {
        assert_eq!(MetricsSample::new(850, 1000).usage_percent(), Some(85.0));
        assert_eq!(MetricsSample::new(0, 0).usage_percent(), None);
        assert_eq!(MetricsSample::unavailable().usage_percent(), None);
    }

    #[test]
    fn test_workload_phase_mapping() {
        assert_eq!(WorkloadPhase::from_phase(Some("Running")), WorkloadPhase::Running);
        assert_eq!(WorkloadPhase::from_phase(Some("Evicted")), WorkloadPhase::Unknown);
        assert_eq!(WorkloadPhase::from_phase(None), WorkloadPhase::Unknown);
        assert!(WorkloadPhase::Pending.is_disruptable());
        assert!(!WorkloadPhase::Succeeded.is_disruptable());
        assert!(!WorkloadPhase::Unknown.is_disruptable());
    }
}
