//! Annotation → policy resolution

use super::{annotations, parse_duration, AutoscalePolicy, PolicyDefaults};
use crate::error::ConfigParseError;
use crate::quantity::Quantity;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Resolves annotations into an [`AutoscalePolicy`].
///
/// Total: every missing, unparsable or out-of-range value falls back to the
/// configured default.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    defaults: PolicyDefaults,
}

impl PolicyResolver {
    pub fn new(defaults: PolicyDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &PolicyDefaults {
        &self.defaults
    }

    /// Resolve a policy, logging every rejected value
    pub fn resolve(&self, annotations: &BTreeMap<String, String>) -> AutoscalePolicy {
        let (policy, issues) = self.resolve_with_issues(annotations);
        for issue in &issues {
            warn!(
                annotation = %issue.key(),
                error = %issue,
                "Invalid annotation value, using default"
            );
        }
        policy
    }

    /// Resolve a policy and return the rejected values alongside it
    pub fn resolve_with_issues(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> (AutoscalePolicy, Vec<ConfigParseError>) {
        let mut issues = Vec::new();
        let mut policy = AutoscalePolicy::from(&self.defaults);

        if let Some(raw) = annotations.get(annotations::POLLING_FREQUENCY) {
            match polling_interval(raw) {
                Ok(interval) => policy.polling_interval = interval,
                Err(e) => issues.push(e),
            }
        }

        if let Some(raw) = annotations.get(annotations::EXPAND_BY_PERCENT) {
            match percent(annotations::EXPAND_BY_PERCENT, raw, 1, None) {
                Ok(value) => policy.growth_percent = value,
                Err(e) => issues.push(e),
            }
        }

        if let Some(raw) = annotations.get(annotations::EXPAND_THRESHOLD_PERCENT) {
            match percent(annotations::EXPAND_THRESHOLD_PERCENT, raw, 1, Some(99)) {
                Ok(value) => policy.threshold_percent = value,
                Err(e) => issues.push(e),
            }
        }

        if let Some(raw) = annotations.get(annotations::EXPAND_UP_TO) {
            match raw.parse::<Quantity>() {
                Ok(ceiling) => policy.ceiling = ceiling,
                Err(source) => issues.push(ConfigParseError::Quantity {
                    key: annotations::EXPAND_UP_TO.to_string(),
                    value: raw.clone(),
                    source,
                }),
            }
        }

        (policy, issues)
    }
}

fn polling_interval(raw: &str) -> Result<Duration, ConfigParseError> {
    parse_duration(raw).map_err(|source| ConfigParseError::Duration {
        key: annotations::POLLING_FREQUENCY.to_string(),
        value: raw.to_string(),
        source,
    })
}

fn percent(key: &str, raw: &str, min: i64, max: Option<i64>) -> Result<u32, ConfigParseError> {
    let value: i64 = raw
        .parse()
        .map_err(|_| ConfigParseError::NotAnInteger {
            key: key.to_string(),
            value: raw.to_string(),
        })?;

    if value < min {
        return Err(ConfigParseError::OutOfRange {
            key: key.to_string(),
            value,
            reason: "must be at least 1",
        });
    }
    if let Some(max) = max {
        if value > max {
            return Err(ConfigParseError::OutOfRange {
                key: key.to_string(),
                value,
                reason: "must be between 1 and 99",
            });
        }
    }

    u32::try_from(value).map_err(|_| ConfigParseError::OutOfRange {
        key: key.to_string(),
        value,
        reason: "too large",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_annotations_yield_defaults() {
        let resolver = PolicyResolver::default();
        let (policy, issues) = resolver.resolve_with_issues(&BTreeMap::new());

        assert!(issues.is_empty());
        assert_eq!(policy, AutoscalePolicy::from(&PolicyDefaults::default()));
    }

    #[test]
    fn test_valid_annotations_override_defaults() {
        let resolver = PolicyResolver::default();
        let policy = resolver.resolve(&annotated(&[
            (annotations::POLLING_FREQUENCY, "1m"),
            (annotations::EXPAND_BY_PERCENT, "50"),
            (annotations::EXPAND_THRESHOLD_PERCENT, "90"),
            (annotations::EXPAND_UP_TO, "20Gi"),
        ]));

        assert_eq!(policy.polling_interval, Duration::from_secs(60));
        assert_eq!(policy.growth_percent, 50);
        assert_eq!(policy.threshold_percent, 90);
        assert_eq!(policy.ceiling, "20Gi".parse::<Quantity>().unwrap());
    }

    #[test]
    fn test_invalid_values_fall_back_individually() {
        let resolver = PolicyResolver::default();
        let (policy, issues) = resolver.resolve_with_issues(&annotated(&[
            (annotations::POLLING_FREQUENCY, "soon"),
            (annotations::EXPAND_BY_PERCENT, "0"),
            (annotations::EXPAND_THRESHOLD_PERCENT, "100"),
            (annotations::EXPAND_UP_TO, "lots"),
        ]));

        assert_eq!(policy, AutoscalePolicy::from(&PolicyDefaults::default()));
        assert_eq!(issues.len(), 4);
        assert!(matches!(issues[0], ConfigParseError::Duration { .. }));
        assert!(matches!(issues[1], ConfigParseError::OutOfRange { value: 0, .. }));
        assert!(matches!(issues[2], ConfigParseError::OutOfRange { value: 100, .. }));
        assert!(matches!(issues[3], ConfigParseError::Quantity { .. }));
    }

    #[test]
    fn test_mixed_valid_and_invalid() {
        let resolver = PolicyResolver::default();
        let (policy, issues) = resolver.resolve_with_issues(&annotated(&[
            (annotations::EXPAND_BY_PERCENT, "abc"),
            (annotations::EXPAND_THRESHOLD_PERCENT, "70"),
        ]));

        assert_eq!(policy.growth_percent, 25);
        assert_eq!(policy.threshold_percent, 70);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ConfigParseError::NotAnInteger { .. }));
    }

    #[test]
    fn test_threshold_bounds_are_inclusive() {
        let resolver = PolicyResolver::default();
        for (raw, expected) in [("1", 1), ("99", 99), ("0", 80), ("-5", 80)] {
            let policy =
                resolver.resolve(&annotated(&[(annotations::EXPAND_THRESHOLD_PERCENT, raw)]));
            assert_eq!(policy.threshold_percent, expected, "threshold {raw}");
        }
    }

    #[test]
    fn test_zero_polling_frequency_rejected() {
        let resolver = PolicyResolver::default();
        let policy = resolver.resolve(&annotated(&[(annotations::POLLING_FREQUENCY, "0s")]));
        assert_eq!(policy.polling_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_custom_defaults_are_used() {
        let resolver = PolicyResolver::new(PolicyDefaults {
            polling_interval: Duration::from_secs(120),
            growth_percent: 10,
            threshold_percent: 95,
            ceiling: "1Ti".parse().unwrap(),
        });

        let policy = resolver.resolve(&annotated(&[(annotations::EXPAND_BY_PERCENT, "nope")]));
        assert_eq!(policy.polling_interval, Duration::from_secs(120));
        assert_eq!(policy.growth_percent, 10);
        assert_eq!(policy.threshold_percent, 95);
        assert_eq!(policy.ceiling.value(), 1 << 40);
    }

    #[test]
    fn test_extreme_ceiling_falls_back_to_default() {
        let resolver = PolicyResolver::default();
        let (policy, issues) = resolver
            .resolve_with_issues(&annotated(&[(annotations::EXPAND_UP_TO, "1.5e-2147483648")]));

        assert_eq!(policy.ceiling, Quantity::max());
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            &issues[0],
            ConfigParseError::Quantity { key, .. } if key == annotations::EXPAND_UP_TO
        ));
    }

    #[test]
    fn test_percent_with_whitespace_rejected() {
        let resolver = PolicyResolver::default();
        let (policy, issues) = resolver.resolve_with_issues(&annotated(&[
            (annotations::EXPAND_BY_PERCENT, " 50"),
            (annotations::EXPAND_THRESHOLD_PERCENT, "90 "),
        ]));

        assert_eq!(policy.growth_percent, 25);
        assert_eq!(policy.threshold_percent, 80);
        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .all(|i| matches!(i, ConfigParseError::NotAnInteger { .. })));
    }

    #[test]
    fn test_unrelated_annotations_ignored() {
        let resolver = PolicyResolver::default();
        let (_, issues) = resolver.resolve_with_issues(&annotated(&[
            ("kubectl.kubernetes.io/last-applied-configuration", "{}"),
            (annotations::AUTO_EXPAND, "true"),
        ]));
        assert!(issues.is_empty());
    }
}
