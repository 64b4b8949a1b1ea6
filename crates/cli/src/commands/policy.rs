//! Offline policy resolution

use anyhow::{bail, Result};
use expander_lib::policy::annotations::AUTO_EXPAND;
use expander_lib::policy::is_opted_in;
use expander_lib::{AutoscalePolicy, ConfigParseError, PolicyResolver};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::output::{
    format_ceiling, format_duration, print_field, print_json, print_success, print_warning,
    OutputFormat,
};

/// Prefix added to annotation keys given without one
const ANNOTATION_PREFIX: &str = "volume-expander-operator.redhat-cop.io/";

#[derive(Debug, Serialize)]
pub struct PolicyReport {
    pub opted_in: bool,
    pub policy: AutoscalePolicy,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Serialize)]
pub struct Issue {
    pub annotation: String,
    pub error: String,
}

impl From<&ConfigParseError> for Issue {
    fn from(error: &ConfigParseError) -> Self {
        Self {
            annotation: error.key().to_string(),
            error: error.to_string(),
        }
    }
}

/// Parse `KEY=VALUE` pairs; bare keys get the operator's annotation prefix
pub fn parse_annotations(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got {:?}", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Empty annotation key in {:?}", pair);
        }
        let key = if key.contains('/') {
            key.to_string()
        } else {
            format!("{}{}", ANNOTATION_PREFIX, key)
        };
        map.insert(key, value.to_string());
    }
    Ok(map)
}

pub fn build_report(annotations: &BTreeMap<String, String>, resolver: &PolicyResolver) -> PolicyReport {
    let (policy, issues) = resolver.resolve_with_issues(annotations);
    PolicyReport {
        opted_in: is_opted_in(annotations),
        policy,
        issues: issues.iter().map(Issue::from).collect(),
    }
}

/// Resolve a policy from annotations given on the command line
pub fn resolve(pairs: &[String], resolver: &PolicyResolver, format: OutputFormat) -> Result<()> {
    let annotations = parse_annotations(pairs)?;
    let report = build_report(&annotations, resolver);

    if format == OutputFormat::Json {
        print_json(&report);
        return Ok(());
    }

    print_field("Opted in", if report.opted_in { "yes" } else { "no" });
    print_field("Poll every", &format_duration(report.policy.polling_interval));
    print_field("Threshold", &format!("{}%", report.policy.threshold_percent));
    print_field("Grow by", &format!("{}%", report.policy.growth_percent));
    print_field("Up to", &format_ceiling(&report.policy.ceiling));
    println!();

    if !report.opted_in {
        print_warning(&format!("Set {}=true to manage the claim", AUTO_EXPAND));
    }
    if report.issues.is_empty() {
        print_success("All annotations valid");
    }
    for issue in &report.issues {
        print_warning(&format!("{} (default used)", issue.error));
    }

    Ok(())
}
