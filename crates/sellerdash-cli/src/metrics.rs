//! `metrics` command handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use sellerdash_core::{ReportFilter, ReportRow, ReportType, TypeRegistry};
use sellerdash_ingest::{PgReportStore, ReportStore};
use sellerdash_metrics::{
    builtin_engine, default_drop_thresholds, default_metric_ids, detect_anomalies,
    previous_period, raw_numbers, MetricContext, MetricEngine, MetricResult,
};

#[derive(Debug)]
pub(crate) struct MetricsRequest {
    pub report_type: ReportType,
    pub store_id: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Empty means the report type's built-in catalog.
    pub metric_ids: Vec<String>,
    pub compare_previous: bool,
}

impl MetricsRequest {
    /// Reject a range whose start falls after its end.
    fn validate(&self) -> anyhow::Result<()> {
        if self.from > self.to {
            anyhow::bail!("--from {} is after --to {}", self.from, self.to);
        }
        Ok(())
    }

    fn ids(&self) -> Vec<String> {
        if self.metric_ids.is_empty() {
            default_metric_ids(self.report_type)
        } else {
            self.metric_ids.clone()
        }
    }
}

fn context_for(store_id: i64, from: NaiveDate, to: NaiveDate) -> MetricContext {
    MetricContext::from([
        ("store_id".to_string(), store_id.to_string()),
        ("date_range".to_string(), format!("{from}..{to}")),
    ])
}

async fn evaluate(
    store: &PgReportStore,
    engine: &MetricEngine,
    request: &MetricsRequest,
    ids: &[String],
    (from, to): (NaiveDate, NaiveDate),
) -> anyhow::Result<(Vec<ReportRow>, BTreeMap<String, MetricResult>)> {
    let rows = store
        .query_rows(
            request.report_type,
            request.store_id,
            &ReportFilter::between(from, to),
        )
        .await?;
    let results = engine.calculate_many(ids, &rows, &context_for(request.store_id, from, to))?;
    Ok((rows, results))
}

/// Evaluate metrics over one store's rows in `from..=to` and print them.
///
/// With `compare_previous`, the same metrics are evaluated over the
/// preceding window of equal length and drops beyond the configured
/// thresholds are listed.
///
/// # Errors
///
/// Returns an error if `from` is after `to`, the row query fails, or a
/// metric id is unknown.
pub(crate) async fn run_metrics(
    pool: &sqlx::PgPool,
    registry: Arc<TypeRegistry>,
    request: &MetricsRequest,
) -> anyhow::Result<()> {
    request.validate()?;
    let engine = builtin_engine()?;
    let store = PgReportStore::new(pool.clone(), registry);
    let ids = request.ids();

    let (rows, results) = evaluate(&store, &engine, request, &ids, (request.from, request.to)).await?;
    println!(
        "{} metrics for store {}, {} to {} ({} rows)",
        request.report_type,
        request.store_id,
        request.from,
        request.to,
        rows.len()
    );
    println!("{:<24}{:<10}VALUE", "METRIC", "LEVEL");
    for id in &ids {
        if let Some(result) = results.get(id) {
            print_result(result);
        }
    }

    if request.compare_previous {
        let window = previous_period(request.from, request.to);
        let (_, previous) = evaluate(&store, &engine, request, &ids, window).await?;
        let anomalies = detect_anomalies(
            &raw_numbers(&results),
            &raw_numbers(&previous),
            &default_drop_thresholds(),
        );
        println!();
        println!("compared with {} to {}:", window.0, window.1);
        if anomalies.is_empty() {
            println!("  no drops beyond alert thresholds");
        }
        for a in &anomalies {
            println!(
                "  {:<22}{:<10}{:+.2}% ({} -> {})",
                a.metric_id,
                a.level.to_string(),
                a.change_percent,
                a.previous,
                a.current
            );
        }
    }

    Ok(())
}

fn print_result(result: &MetricResult) {
    let level = result.threshold_level.to_string();
    if result.formatted_groups.is_empty() {
        println!("{:<24}{:<10}{}", result.metric_id, level, result.formatted_value);
        return;
    }
    println!("{:<24}{:<10}", result.metric_id, level);
    for (group, value) in &result.formatted_groups {
        println!("  {group:<32}{value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_carries_cache_key_fields() {
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let context = context_for(3, from, to);
        assert_eq!(context["store_id"], "3");
        assert_eq!(context["date_range"], "2025-01-01..2025-01-31");
    }

    fn request(from: (i32, u32, u32), to: (i32, u32, u32)) -> MetricsRequest {
        MetricsRequest {
            report_type: ReportType::Returns,
            store_id: 1,
            from: NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            to: NaiveDate::from_ymd_opt(to.0, to.1, to.2).unwrap(),
            metric_ids: Vec::new(),
            compare_previous: false,
        }
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = request((2025, 2, 1), (2025, 1, 1)).validate().unwrap_err();
        assert_eq!(err.to_string(), "--from 2025-02-01 is after --to 2025-01-01");
    }

    #[test]
    fn single_day_range_is_accepted() {
        assert!(request((2025, 1, 15), (2025, 1, 15)).validate().is_ok());
    }

    #[test]
    fn empty_metric_list_defaults_to_catalog() {
        let request = request((2025, 1, 1), (2025, 1, 31));
        assert_eq!(
            request.ids(),
            ["total_returns", "total_refunds", "average_refund"]
        );
    }
}
