//! Period-over-period comparison of metric values.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::types::{MetricResult, ThresholdLevel};

/// Percent changes at or below which a drop is reported. Both are negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropThresholds {
    pub critical_drop: f64,
    pub warning_drop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub metric_id: String,
    pub current: f64,
    pub previous: f64,
    pub change_percent: f64,
    pub level: ThresholdLevel,
}

/// Drop thresholds for the built-in business metrics.
#[must_use]
pub fn default_drop_thresholds() -> BTreeMap<String, DropThresholds> {
    BTreeMap::from([
        (
            "total_revenue".to_string(),
            DropThresholds {
                critical_drop: -30.0,
                warning_drop: -15.0,
            },
        ),
        (
            "conversion_rate".to_string(),
            DropThresholds {
                critical_drop: -20.0,
                warning_drop: -10.0,
            },
        ),
    ])
}

/// The window of the same number of days immediately before `start..=end`.
#[must_use]
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (start, end) = if end < start { (end, start) } else { (start, end) };
    let days = (end - start).num_days() + 1;
    (start - Duration::days(days), start - Duration::days(1))
}

/// Scalar raw values of `results`; grouped metrics are left out.
#[must_use]
pub fn raw_numbers(results: &BTreeMap<String, MetricResult>) -> BTreeMap<String, f64> {
    results
        .iter()
        .filter_map(|(id, r)| r.raw_value.as_number().map(|n| (id.clone(), n)))
        .collect()
}

/// Percent change of every thresholded metric present in both periods.
/// Metrics whose previous value is 0 are skipped.
#[must_use]
pub fn compare_periods(
    current: &BTreeMap<String, f64>,
    previous: &BTreeMap<String, f64>,
    thresholds: &BTreeMap<String, DropThresholds>,
) -> Vec<PeriodChange> {
    let mut changes = Vec::new();
    for (metric_id, limits) in thresholds {
        let (Some(&cur), Some(&prev)) = (current.get(metric_id), previous.get(metric_id)) else {
            continue;
        };
        if prev == 0.0 {
            continue;
        }
        let change_percent = (cur - prev) / prev * 100.0;
        let level = if change_percent <= limits.critical_drop {
            ThresholdLevel::Critical
        } else if change_percent <= limits.warning_drop {
            ThresholdLevel::Warning
        } else {
            ThresholdLevel::Normal
        };
        changes.push(PeriodChange {
            metric_id: metric_id.clone(),
            current: cur,
            previous: prev,
            change_percent,
            level,
        });
    }
    changes
}

/// The subset of [`compare_periods`] that breached a drop threshold.
#[must_use]
pub fn detect_anomalies(
    current: &BTreeMap<String, f64>,
    previous: &BTreeMap<String, f64>,
    thresholds: &BTreeMap<String, DropThresholds>,
) -> Vec<PeriodChange> {
    let anomalies: Vec<PeriodChange> = compare_periods(current, previous, thresholds)
        .into_iter()
        .filter(|c| c.level != ThresholdLevel::Normal)
        .collect();
    for a in &anomalies {
        tracing::info!(
            metric_id = %a.metric_id,
            change_percent = a.change_percent,
            level = %a.level,
            "metric dropped against previous period"
        );
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn classifies_drops_against_defaults() {
        let previous = values(&[("total_revenue", 1000.0), ("conversion_rate", 10.0)]);
        let current = values(&[("total_revenue", 650.0), ("conversion_rate", 8.5)]);
        let anomalies = detect_anomalies(&current, &previous, &default_drop_thresholds());
        assert_eq!(anomalies.len(), 2);
        let by_id: BTreeMap<_, _> = anomalies
            .iter()
            .map(|a| (a.metric_id.as_str(), a.level))
            .collect();
        assert_eq!(by_id["total_revenue"], ThresholdLevel::Critical);
        assert_eq!(by_id["conversion_rate"], ThresholdLevel::Warning);
    }

    #[test]
    fn growth_and_small_drops_are_not_anomalies() {
        let previous = values(&[("total_revenue", 1000.0)]);
        let current = values(&[("total_revenue", 900.0)]);
        let changes = compare_periods(&current, &previous, &default_drop_thresholds());
        assert_eq!(changes.len(), 1);
        assert!((changes[0].change_percent + 10.0).abs() < 1e-9);
        assert_eq!(changes[0].level, ThresholdLevel::Normal);
        assert!(detect_anomalies(&current, &previous, &default_drop_thresholds()).is_empty());
    }

    #[test]
    fn zero_previous_and_missing_metrics_are_skipped() {
        let previous = values(&[("total_revenue", 0.0)]);
        let current = values(&[("total_revenue", 10.0), ("conversion_rate", 1.0)]);
        assert!(compare_periods(&current, &previous, &default_drop_thresholds()).is_empty());
    }

    #[test]
    fn previous_period_precedes_start() {
        let d = |s: &str| s.parse::<NaiveDate>().unwrap();
        assert_eq!(
            previous_period(d("2025-01-31"), d("2025-02-06")),
            (d("2025-01-24"), d("2025-01-30"))
        );
        assert_eq!(
            previous_period(d("2025-03-01"), d("2025-03-01")),
            (d("2025-02-28"), d("2025-02-28"))
        );
    }
}
