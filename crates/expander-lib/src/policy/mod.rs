//! Per-claim autoscaling policy
//!
//! A claim opts in and tunes its expansion through annotations. The resolver
//! turns that sparse, possibly malformed map into a fully populated
//! [`AutoscalePolicy`] on every pass.

mod duration;
mod resolver;

pub use duration::parse_duration;
pub use resolver::PolicyResolver;

use crate::quantity::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Annotation keys read from claims
pub mod annotations {
    /// Opt-in marker; a claim is managed only when this equals `"true"`
    pub const AUTO_EXPAND: &str = "volume-expander-operator.redhat-cop.io/autoexpand";
    pub const POLLING_FREQUENCY: &str = "volume-expander-operator.redhat-cop.io/polling-frequency";
    pub const EXPAND_BY_PERCENT: &str = "volume-expander-operator.redhat-cop.io/expand-by-percent";
    pub const EXPAND_THRESHOLD_PERCENT: &str =
        "volume-expander-operator.redhat-cop.io/expand-threshold-percent";
    pub const EXPAND_UP_TO: &str = "volume-expander-operator.redhat-cop.io/expand-up-to";
}

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_GROWTH_PERCENT: u32 = 25;
pub const DEFAULT_THRESHOLD_PERCENT: u32 = 80;

/// Resolved autoscaling policy for one claim, valid for one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalePolicy {
    /// Delay before the next pass
    pub polling_interval: Duration,
    /// Growth applied to the current capacity, in percent (>= 1)
    pub growth_percent: u32,
    /// Usage ratio that must be exceeded to grow, in percent (1..=99)
    pub threshold_percent: u32,
    /// Upper bound for the requested capacity
    pub ceiling: Quantity,
}

/// Fallback values for every tunable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDefaults {
    pub polling_interval: Duration,
    pub growth_percent: u32,
    pub threshold_percent: u32,
    pub ceiling: Quantity,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            growth_percent: DEFAULT_GROWTH_PERCENT,
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            ceiling: Quantity::max(),
        }
    }
}

impl From<&PolicyDefaults> for AutoscalePolicy {
    fn from(defaults: &PolicyDefaults) -> Self {
        Self {
            polling_interval: defaults.polling_interval,
            growth_percent: defaults.growth_percent,
            threshold_percent: defaults.threshold_percent,
            ceiling: defaults.ceiling,
        }
    }
}

/// Whether a claim carries the opt-in marker
pub fn is_opted_in(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(annotations::AUTO_EXPAND)
        .is_some_and(|v| v == "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_in_marker() {
        let mut map = BTreeMap::new();
        assert!(!is_opted_in(&map));

        map.insert(annotations::AUTO_EXPAND.to_string(), "false".to_string());
        assert!(!is_opted_in(&map));

        map.insert(annotations::AUTO_EXPAND.to_string(), "True".to_string());
        assert!(!is_opted_in(&map));

        map.insert(annotations::AUTO_EXPAND.to_string(), "true".to_string());
        assert!(is_opted_in(&map));
    }

    #[test]
    fn test_defaults() {
        let policy = AutoscalePolicy::from(&PolicyDefaults::default());
        assert_eq!(policy.polling_interval, Duration::from_secs(30));
        assert_eq!(policy.growth_percent, 25);
        assert_eq!(policy.threshold_percent, 80);
        assert_eq!(policy.ceiling, Quantity::max());
    }
}
