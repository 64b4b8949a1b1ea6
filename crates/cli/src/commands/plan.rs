//! Dry run of one reconciliation pass

use anyhow::{anyhow, Result};
use colored::Colorize;
use expander_lib::disruption;
use expander_lib::k8s::KubeClaimStore;
use expander_lib::metrics::MetricsPoller;
use expander_lib::policy::is_opted_in;
use expander_lib::planner;
use expander_lib::reconcile::ClaimStore;
use expander_lib::{
    AutoscalePolicy, ClaimKey, MetricsError, MetricsSample, PolicyResolver, StorageClaim,
    WorkloadRef,
};
use kube::Client;
use serde::Serialize;

use crate::output::{
    color_usage, format_bytes, format_ceiling, format_duration, print_error, print_field,
    print_info, print_json, print_warning, OutputFormat,
};

/// What a pass would do right now
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// The claim is not managed
    Ignore,
    /// Wait for the metrics source
    WaitForMetrics { reason: String },
    /// The metrics source answered with something unusable; the pass fails
    MetricsRejected { reason: String },
    Expand { from: String, to: String },
    Disrupt { workloads: Vec<String> },
    Nothing,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub claim: String,
    pub opted_in: bool,
    pub requested: String,
    pub provisioned: Option<String>,
    pub policy: AutoscalePolicy,
    pub used_bytes: Option<i64>,
    pub capacity_bytes: Option<i64>,
    pub usage_percent: Option<f64>,
    pub decision: Decision,
}

/// Decide like a reconciliation pass would, without side effects
pub fn build_report(
    claim: &StorageClaim,
    policy: AutoscalePolicy,
    sample: Result<MetricsSample, MetricsError>,
    workloads: &[WorkloadRef],
) -> PlanReport {
    let opted_in = is_opted_in(&claim.annotations);
    let available = sample.as_ref().ok().filter(|s| s.available).copied();

    let decision = if !opted_in {
        Decision::Ignore
    } else {
        match &sample {
            Err(e) if e.is_unavailable() => Decision::WaitForMetrics {
                reason: e.to_string(),
            },
            Err(e) => Decision::MetricsRejected {
                reason: e.to_string(),
            },
            Ok(s) if !s.available => Decision::WaitForMetrics {
                reason: "no series for this claim yet".to_string(),
            },
            Ok(s) => match planner::plan(s, &policy, &claim.requested) {
                Some(target) => Decision::Expand {
                    from: claim.requested.to_string(),
                    to: target.to_string(),
                },
                None if disruption::has_drift(claim) => Decision::Disrupt {
                    workloads: disruption::select(claim, workloads)
                        .into_iter()
                        .map(|w| w.name)
                        .collect(),
                },
                None => Decision::Nothing,
            },
        }
    };

    PlanReport {
        claim: claim.key.to_string(),
        opted_in,
        requested: claim.requested.to_string(),
        provisioned: claim.provisioned.map(|p| p.to_string()),
        policy,
        used_bytes: available.map(|s| s.used_bytes),
        capacity_bytes: available.map(|s| s.capacity_bytes),
        usage_percent: available.and_then(|s| s.usage_percent()),
        decision,
    }
}

/// Show what the operator would do for one claim. Never writes.
pub async fn plan_claim(
    client: Client,
    poller: &MetricsPoller,
    resolver: &PolicyResolver,
    name: &str,
    namespace: &str,
    format: OutputFormat,
) -> Result<()> {
    let store = KubeClaimStore::new(client);
    let key = ClaimKey::new(namespace, name);

    let claim = store
        .get(&key)
        .await?
        .ok_or_else(|| anyhow!("Claim {} not found", key))?;

    let policy = resolver.resolve(&claim.annotations);
    let sample = poller.poll(&key).await;
    let workloads = if disruption::has_drift(&claim) {
        store.list_workloads(namespace).await?
    } else {
        Vec::new()
    };

    let report = build_report(&claim, policy, sample, &workloads);

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &PlanReport) {
    println!("{}", report.claim.bold());
    print_field("Requested", &report.requested);
    print_field(
        "Provisioned",
        report.provisioned.as_deref().unwrap_or("-"),
    );
    print_field(
        "Policy",
        &format!(
            "poll {}, grow {}% above {}%, up to {}",
            format_duration(report.policy.polling_interval),
            report.policy.growth_percent,
            report.policy.threshold_percent,
            format_ceiling(&report.policy.ceiling)
        ),
    );

    if let (Some(used), Some(capacity)) = (report.used_bytes, report.capacity_bytes) {
        let usage = report
            .usage_percent
            .map(|p| color_usage(p, report.policy.threshold_percent))
            .unwrap_or_else(|| "-".to_string());
        print_field(
            "Usage",
            &format!("{} of {} ({})", format_bytes(used), format_bytes(capacity), usage),
        );
    }
    println!();

    match &report.decision {
        Decision::Ignore => print_warning("Claim is not opted in; the operator ignores it"),
        Decision::WaitForMetrics { reason } => {
            print_warning(&format!("Waiting for metrics: {}", reason))
        }
        Decision::MetricsRejected { reason } => {
            print_error(&format!("Pass would fail on metrics: {}", reason))
        }
        Decision::Expand { from, to } => {
            print_info(&format!("Would raise requested capacity from {} to {}", from, to))
        }
        Decision::Disrupt { workloads } if workloads.is_empty() => {
            print_info("Resize pending; no running pods mount this claim")
        }
        Decision::Disrupt { workloads } => print_info(&format!(
            "Resize pending; would delete pods: {}",
            workloads.join(", ")
        )),
        Decision::Nothing => print_info("Nothing to do"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expander_lib::policy::annotations;
    use expander_lib::WorkloadPhase;
    use std::collections::BTreeMap;

    fn claim(requested: &str, provisioned: &str, opted_in: bool) -> StorageClaim {
        let mut map = BTreeMap::new();
        if opted_in {
            map.insert(annotations::AUTO_EXPAND.to_string(), "true".to_string());
        }
        StorageClaim {
            key: ClaimKey::new("default", "data"),
            uid: None,
            resource_version: None,
            annotations: map,
            requested: requested.parse().unwrap(),
            provisioned: Some(provisioned.parse().unwrap()),
        }
    }

    fn policy() -> AutoscalePolicy {
        AutoscalePolicy::from(&expander_lib::PolicyDefaults::default())
    }

    #[test]
    fn test_hot_claim_would_expand() {
        let hot = claim("1000", "1000", true);
        let report = build_report(&hot, policy(), Ok(MetricsSample::new(850, 1000)), &[]);

        assert_eq!(
            report.decision,
            Decision::Expand {
                from: hot.requested.to_string(),
                to: "1250".to_string(),
            }
        );
        assert!((report.usage_percent.unwrap() - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_pending_resize_lists_live_pods() {
        let workloads = vec![
            WorkloadRef {
                namespace: "default".to_string(),
                name: "web-0".to_string(),
                phase: WorkloadPhase::Running,
                claim_names: vec!["data".to_string()],
            },
            WorkloadRef {
                namespace: "default".to_string(),
                name: "job-0".to_string(),
                phase: WorkloadPhase::Succeeded,
                claim_names: vec!["data".to_string()],
            },
        ];

        let report = build_report(
            &claim("1100", "1000", true),
            policy(),
            Ok(MetricsSample::new(100, 1000)),
            &workloads,
        );

        assert_eq!(
            report.decision,
            Decision::Disrupt {
                workloads: vec!["web-0".to_string()]
            }
        );
    }

    #[test]
    fn test_unavailable_metrics_wait() {
        let report = build_report(
            &claim("1000", "1000", true),
            policy(),
            Err(MetricsError::unavailable("connection refused")),
            &[],
        );

        assert!(matches!(report.decision, Decision::WaitForMetrics { .. }));
        assert!(report.used_bytes.is_none());
    }

    #[test]
    fn test_metrics_shape_error_is_a_failure() {
        let report = build_report(
            &claim("1000", "1000", true),
            policy(),
            Err(MetricsError::shape("kubelet_volume_stats_used_bytes", "2 series")),
            &[],
        );

        assert!(matches!(report.decision, Decision::MetricsRejected { .. }));
    }

    #[test]
    fn test_unmanaged_claim_is_ignored() {
        let report = build_report(
            &claim("1000", "1000", false),
            policy(),
            Ok(MetricsSample::new(999, 1000)),
            &[],
        );

        assert_eq!(report.decision, Decision::Ignore);
        assert!(!report.opted_in);
    }
}
