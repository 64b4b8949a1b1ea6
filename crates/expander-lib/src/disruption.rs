//! Selection of workloads to disrupt while a resize is pending
//!
//! When the requested size of a claim differs from what the backend has
//! provisioned, the filesystem resize usually completes only once the volume
//! is remounted. Removing the live workloads that mount the claim lets them be
//! rescheduled against the resized volume.

use crate::models::{StorageClaim, WorkloadRef};

/// Requested and provisioned capacity disagree.
///
/// A claim with no provisioned capacity yet (unbound) is not drifting.
pub fn has_drift(claim: &StorageClaim) -> bool {
    claim
        .provisioned
        .is_some_and(|provisioned| provisioned != claim.requested)
}

/// Workloads that must be removed for the claim's resize to complete.
///
/// Empty when the claim is not drifting. Otherwise every running or pending
/// workload that mounts the claim by name.
pub fn select(claim: &StorageClaim, workloads: &[WorkloadRef]) -> Vec<WorkloadRef> {
    if !has_drift(claim) {
        return Vec::new();
    }

    workloads
        .iter()
        .filter(|w| w.namespace == claim.key.namespace)
        .filter(|w| w.mounts(&claim.key.name))
        .filter(|w| w.phase.is_disruptable())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaimKey, WorkloadPhase};
    use crate::quantity::Quantity;
    use std::collections::BTreeMap;

    fn claim(requested: i64, provisioned: Option<i64>) -> StorageClaim {
        StorageClaim {
            key: ClaimKey::new("default", "data"),
            uid: None,
            resource_version: None,
            annotations: BTreeMap::new(),
            requested: Quantity::binary(requested),
            provisioned: provisioned.map(Quantity::binary),
        }
    }

    fn workload(name: &str, phase: WorkloadPhase, claims: &[&str]) -> WorkloadRef {
        WorkloadRef {
            namespace: "default".to_string(),
            name: name.to_string(),
            phase,
            claim_names: claims.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_selects_only_live_attached_workloads() {
        let workloads = vec![
            workload("web-0", WorkloadPhase::Running, &["data"]),
            workload("job-1", WorkloadPhase::Succeeded, &["data"]),
        ];

        let selected = select(&claim(1100, Some(1000)), &workloads);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "web-0");
    }

    #[test]
    fn test_excludes_unattached_and_terminal() {
        let workloads = vec![
            workload("other", WorkloadPhase::Running, &["logs"]),
            workload("failed", WorkloadPhase::Failed, &["data"]),
            workload("unknown", WorkloadPhase::Unknown, &["data"]),
            workload("pending", WorkloadPhase::Pending, &["logs", "data"]),
            workload("no-volumes", WorkloadPhase::Running, &[]),
        ];

        let selected = select(&claim(2000, Some(1000)), &workloads);

        let names: Vec<_> = selected.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["pending"]);
    }

    #[test]
    fn test_excludes_other_namespaces() {
        let mut foreign = workload("web-0", WorkloadPhase::Running, &["data"]);
        foreign.namespace = "staging".to_string();

        assert!(select(&claim(1100, Some(1000)), &[foreign]).is_empty());
    }

    #[test]
    fn test_no_drift_selects_nothing() {
        let workloads = vec![workload("web-0", WorkloadPhase::Running, &["data"])];

        assert!(select(&claim(1000, Some(1000)), &workloads).is_empty());
        assert!(select(&claim(1000, None), &workloads).is_empty());
    }

    #[test]
    fn test_drift_uses_semantic_equality() {
        let mut c = claim(0, None);
        c.requested = "1Gi".parse().unwrap();
        c.provisioned = Some(Quantity::new(
            1024 * 1024 * 1024,
            crate::quantity::QuantityFormat::DecimalSI,
        ));
        assert!(!has_drift(&c));
    }
}
