//! Claim listing

use anyhow::Result;
use expander_lib::disruption::has_drift;
use expander_lib::k8s::KubeClaimStore;
use expander_lib::policy::is_opted_in;
use expander_lib::{PolicyResolver, StorageClaim};
use kube::Client;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{format_ceiling, format_duration, print_table, OutputFormat};

/// Row for the claims table
#[derive(Debug, Tabled, Serialize)]
pub struct ClaimRow {
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Auto")]
    pub auto_expand: bool,
    #[tabled(rename = "Requested")]
    pub requested: String,
    #[tabled(rename = "Provisioned")]
    pub provisioned: String,
    #[tabled(rename = "Resizing")]
    pub resizing: bool,
    #[tabled(rename = "Poll")]
    pub polling_interval: String,
    #[tabled(rename = "Threshold")]
    pub threshold: String,
    #[tabled(rename = "Grow By")]
    pub growth: String,
    #[tabled(rename = "Up To")]
    pub ceiling: String,
}

/// Build table rows; claims without the opt-in marker are skipped unless
/// `include_all` is set
pub fn claim_rows(
    claims: &[StorageClaim],
    resolver: &PolicyResolver,
    include_all: bool,
) -> Vec<ClaimRow> {
    let mut rows: Vec<ClaimRow> = claims
        .iter()
        .filter(|c| include_all || is_opted_in(&c.annotations))
        .map(|claim| {
            let (policy, _) = resolver.resolve_with_issues(&claim.annotations);
            ClaimRow {
                namespace: claim.key.namespace.clone(),
                name: claim.key.name.clone(),
                auto_expand: is_opted_in(&claim.annotations),
                requested: claim.requested.to_string(),
                provisioned: claim
                    .provisioned
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                resizing: has_drift(claim),
                polling_interval: format_duration(policy.polling_interval),
                threshold: format!("{}%", policy.threshold_percent),
                growth: format!("{}%", policy.growth_percent),
                ceiling: format_ceiling(&policy.ceiling),
            }
        })
        .collect();

    rows.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    rows
}

/// List claims with their resolved policy
pub async fn list_claims(
    client: Client,
    resolver: &PolicyResolver,
    namespace: Option<String>,
    include_all: bool,
    format: OutputFormat,
) -> Result<()> {
    let store = KubeClaimStore::new(client);
    let claims = store.list_claims(namespace.as_deref()).await?;

    let rows = claim_rows(&claims, resolver, include_all);
    print_table(&rows, format);

    Ok(())
}
