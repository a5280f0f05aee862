//! Threshold evaluation

use crate::models::{Severity, ThresholdConfig};

/// Classify a day's spend against the soft and hard thresholds
///
/// Both comparisons are strict: a total equal to a threshold does not cross
/// it. Non-finite totals classify as [`Severity::Ok`].
pub fn evaluate(total_dollars: f64, thresholds: &ThresholdConfig) -> Severity {
    if total_dollars > thresholds.hard_dollars {
        Severity::Hard
    } else if total_dollars > thresholds.soft_dollars {
        Severity::Soft
    } else {
        Severity::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig::new(100.0, 150.0).unwrap()
    }

    #[rstest]
    #[case(0.0, Severity::Ok)]
    #[case(90.0, Severity::Ok)]
    #[case(100.0, Severity::Ok)]
    #[case(100.01, Severity::Soft)]
    #[case(120.0, Severity::Soft)]
    #[case(150.0, Severity::Soft)]
    #[case(150.01, Severity::Hard)]
    #[case(160.0, Severity::Hard)]
    #[case(f64::NAN, Severity::Ok)]
    fn test_classification(#[case] total: f64, #[case] expected: Severity) {
        assert_eq!(evaluate(total, &thresholds()), expected);
    }

    #[test]
    fn test_equal_thresholds_skip_soft() {
        let thresholds = ThresholdConfig::new(50.0, 50.0).unwrap();
        assert_eq!(evaluate(50.0, &thresholds), Severity::Ok);
        assert_eq!(evaluate(50.5, &thresholds), Severity::Hard);
    }

    proptest! {
        #[test]
        fn prop_severity_is_monotonic(
            a in 0.0f64..1_000.0,
            b in 0.0f64..1_000.0,
            soft in 0.0f64..500.0,
            gap in 0.0f64..500.0,
        ) {
            let thresholds = ThresholdConfig::new(soft, soft + gap).unwrap();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(evaluate(low, &thresholds) <= evaluate(high, &thresholds));
        }

        #[test]
        fn prop_thresholds_never_trigger_on_equality(soft in 0.0f64..500.0, gap in 0.0f64..500.0) {
            let thresholds = ThresholdConfig::new(soft, soft + gap).unwrap();
            prop_assert_ne!(evaluate(thresholds.hard_dollars, &thresholds), Severity::Hard);
            prop_assert_eq!(evaluate(thresholds.soft_dollars, &thresholds), Severity::Ok);
        }
    }
}
