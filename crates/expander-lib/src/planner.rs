//! Capacity planning
//!
//! Decides whether a claim must grow and by how much. Pure: no I/O, no
//! clock, no logging.

use crate::models::MetricsSample;
use crate::policy::AutoscalePolicy;
use crate::quantity::Quantity;

/// Compute the next requested capacity, or `None` when no growth is due.
///
/// Growth happens only when usage strictly exceeds the threshold. The new
/// size is `capacity * (100 + growth) / 100` in integer arithmetic, capped at
/// the policy ceiling, and must be strictly larger than the current request.
///
/// Only the current request is compared: a previously requested growth the
/// backend has not realised yet does not block another one.
pub fn plan(
    sample: &MetricsSample,
    policy: &AutoscalePolicy,
    current_requested: &Quantity,
) -> Option<Quantity> {
    if !sample.available || sample.capacity_bytes <= 0 {
        return None;
    }

    let used = i128::from(sample.used_bytes);
    let capacity = i128::from(sample.capacity_bytes);

    // used / capacity * 100 > threshold, without division
    if used * 100 <= i128::from(policy.threshold_percent) * capacity {
        return None;
    }

    let grown = capacity * (100 + i128::from(policy.growth_percent)) / 100;
    let grown = i64::try_from(grown).unwrap_or(i64::MAX);

    let candidate = if policy.ceiling.value() > grown {
        Quantity::binary(grown)
    } else {
        policy.ceiling
    };

    (candidate > *current_requested).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(threshold: u32, growth: u32, ceiling: Quantity) -> AutoscalePolicy {
        AutoscalePolicy {
            polling_interval: Duration::from_secs(30),
            growth_percent: growth,
            threshold_percent: threshold,
            ceiling,
        }
    }

    fn bytes(v: i64) -> Quantity {
        Quantity::binary(v)
    }

    #[test]
    fn test_grows_by_percent() {
        let result = plan(
            &MetricsSample::new(850, 1000),
            &policy(80, 25, Quantity::max()),
            &bytes(1000),
        );
        assert_eq!(result.map(|q| q.value()), Some(1250));
    }

    #[test]
    fn test_growth_capped_at_ceiling() {
        let result = plan(
            &MetricsSample::new(850, 1000),
            &policy(80, 25, bytes(1100)),
            &bytes(1000),
        );
        assert_eq!(result.map(|q| q.value()), Some(1100));
    }

    #[test]
    fn test_ceiling_keeps_its_notation() {
        let ceiling: Quantity = "15Gi".parse().unwrap();
        let capacity = 14 * 1024 * 1024 * 1024;
        let result = plan(
            &MetricsSample::new(capacity, capacity),
            &policy(80, 25, ceiling),
            &bytes(capacity),
        )
        .unwrap();
        assert_eq!(result.to_string(), "15Gi");
    }

    #[test]
    fn test_zero_capacity_is_no_action() {
        assert_eq!(
            plan(&MetricsSample::new(10, 0), &policy(80, 25, Quantity::max()), &bytes(0)),
            None
        );
    }

    #[test]
    fn test_unavailable_sample_is_no_action() {
        assert_eq!(
            plan(
                &MetricsSample::unavailable(),
                &policy(80, 25, Quantity::max()),
                &bytes(1000)
            ),
            None
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let p = policy(80, 25, Quantity::max());
        assert_eq!(plan(&MetricsSample::new(800, 1000), &p, &bytes(1000)), None);
        assert_eq!(plan(&MetricsSample::new(799, 1000), &p, &bytes(1000)), None);
        assert!(plan(&MetricsSample::new(801, 1000), &p, &bytes(1000)).is_some());
    }

    #[test]
    fn test_never_reissues_or_shrinks() {
        let p = policy(80, 25, Quantity::max());
        // Already requested 1250 on a 1000 byte volume.
        assert_eq!(plan(&MetricsSample::new(900, 1000), &p, &bytes(1250)), None);
        assert_eq!(plan(&MetricsSample::new(900, 1000), &p, &bytes(5000)), None);
    }

    #[test]
    fn test_ceiling_below_request_is_no_action() {
        let p = policy(80, 25, bytes(900));
        assert_eq!(plan(&MetricsSample::new(950, 1000), &p, &bytes(1000)), None);
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let capacity = i64::MAX / 2;
        let p = policy(50, 300, Quantity::max());
        let result = plan(&MetricsSample::new(capacity, capacity), &p, &bytes(capacity)).unwrap();
        assert_eq!(result, Quantity::max());
    }

    #[test]
    fn test_properties_over_a_grid() {
        let ceilings = [bytes(500), bytes(1100), bytes(3000), Quantity::max()];
        for growth in [1u32, 5, 25, 100, 250] {
            for threshold in [1u32, 50, 80, 99] {
                for used in [0i64, 400, 800, 999, 1000, 1200] {
                    for requested in [500i64, 1000, 1250, 4000] {
                        for ceiling in ceilings {
                            let p = policy(threshold, growth, ceiling);
                            let sample = MetricsSample::new(used, 1000);
                            let result = plan(&sample, &p, &bytes(requested));

                            if used * 100 <= i64::from(threshold) * 1000 {
                                assert_eq!(result, None);
                            }
                            if let Some(candidate) = result {
                                assert!(candidate.value() > requested);
                                assert!(candidate <= ceiling);
                            }
                        }
                    }
                }
            }
        }
    }
}
