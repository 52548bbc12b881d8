use crate::types::{Direction, ThresholdLevel, Thresholds};

/// Classify `value` against `thresholds`. Boundaries are inclusive; NaN and
/// unconfigured thresholds are always normal.
#[must_use]
pub fn classify(value: f64, thresholds: Option<&Thresholds>) -> ThresholdLevel {
    let Some(t) = thresholds else {
        return ThresholdLevel::Normal;
    };
    if value.is_nan() {
        return ThresholdLevel::Normal;
    }
    let breaches = |bound: f64| match t.direction {
        Direction::Desc => value <= bound,
        Direction::Asc => value >= bound,
    };
    if breaches(t.critical) {
        ThresholdLevel::Critical
    } else if breaches(t.warning) {
        ThresholdLevel::Warning
    } else {
        ThresholdLevel::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVENUE: Thresholds = Thresholds {
        warning: 1000.0,
        critical: 500.0,
        direction: Direction::Desc,
    };
    const ACOS: Thresholds = Thresholds {
        warning: 30.0,
        critical: 50.0,
        direction: Direction::Asc,
    };

    #[test]
    fn descending_boundaries_are_inclusive() {
        assert_eq!(classify(500.0, Some(&REVENUE)), ThresholdLevel::Critical);
        assert_eq!(classify(500.01, Some(&REVENUE)), ThresholdLevel::Warning);
        assert_eq!(classify(1000.0, Some(&REVENUE)), ThresholdLevel::Warning);
        assert_eq!(classify(1000.01, Some(&REVENUE)), ThresholdLevel::Normal);
    }

    #[test]
    fn ascending_boundaries_are_inclusive() {
        assert_eq!(classify(50.0, Some(&ACOS)), ThresholdLevel::Critical);
        assert_eq!(classify(30.0, Some(&ACOS)), ThresholdLevel::Warning);
        assert_eq!(classify(29.99, Some(&ACOS)), ThresholdLevel::Normal);
    }

    #[test]
    fn no_thresholds_is_normal() {
        assert_eq!(classify(-1e9, None), ThresholdLevel::Normal);
        assert_eq!(classify(f64::NAN, Some(&REVENUE)), ThresholdLevel::Normal);
    }

    #[test]
    fn severity_is_monotonic_in_the_value() {
        let samples: Vec<f64> = (0..=40).map(|i| f64::from(i) * 50.0).collect();
        for pair in samples.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            assert!(classify(lo, Some(&REVENUE)) >= classify(hi, Some(&REVENUE)));
            assert!(classify(lo, Some(&ACOS)) <= classify(hi, Some(&ACOS)));
        }
    }
}
