//! Built-in metric definitions for each report type.

use std::time::Duration;

use sellerdash_core::ReportType;

use crate::engine::{MetricEngine, MetricRegistry};
use crate::error::MetricError;
use crate::expression::numeric_value;
use crate::types::{Direction, Formula, MetricDefinition, MetricValue, Visualization};

const SUMMARY_TTL: Duration = Duration::from_secs(300);
const SUMMARY_KEY: &[&str] = &["store_id", "date_range"];

fn metric(
    id: &str,
    name: &str,
    formula: &str,
    visualization: Visualization,
    category: &str,
) -> MetricDefinition {
    MetricDefinition::new(id, name, Formula::expression(formula), visualization).in_category(category)
}

#[must_use]
pub fn business_metrics() -> Vec<MetricDefinition> {
    vec![
        metric(
            "total_revenue",
            "Total Revenue",
            "sum(ordered_product_sales)",
            Visualization::currency(),
            "sales",
        )
        .describe("Total revenue from all orders")
        .with_thresholds(1000.0, 500.0, Direction::Desc)
        .cached(SUMMARY_TTL, SUMMARY_KEY),
        metric(
            "total_orders",
            "Total Orders",
            "sum(units_ordered)",
            Visualization::number(),
            "sales",
        )
        .describe("Total number of units ordered")
        .cached(SUMMARY_TTL, SUMMARY_KEY),
        metric(
            "total_sessions",
            "Total Sessions",
            "sum(sessions)",
            Visualization::number(),
            "customer",
        )
        .describe("Total number of customer sessions"),
        metric(
            "conversion_rate",
            "Conversion Rate",
            "(sum(units_ordered) / sum(sessions)) * 100",
            Visualization::percentage(),
            "sales",
        )
        .describe("Percentage of sessions resulting in orders")
        .with_thresholds(2.0, 1.0, Direction::Desc),
        metric(
            "average_order_value",
            "Average Order Value",
            "sum(ordered_product_sales) / sum(units_ordered)",
            Visualization::currency(),
            "sales",
        )
        .describe("Average revenue per unit ordered"),
        metric(
            "daily_sales_trend",
            "Daily Sales Trend",
            "sum(ordered_product_sales)",
            Visualization::currency(),
            "sales",
        )
        .describe("Revenue per day")
        .grouped_by("date", None),
        metric(
            "top_products",
            "Top Products",
            "sum(ordered_product_sales)",
            Visualization::currency(),
            "sales",
        )
        .describe("Best performing products by revenue")
        .grouped_by("asin", Some(10)),
    ]
}

#[must_use]
pub fn advertising_metrics() -> Vec<MetricDefinition> {
    vec![
        metric("ad_spend", "Ad Spend", "sum(spend)", Visualization::currency(), "advertising")
            .describe("Total advertising spend")
            .cached(SUMMARY_TTL, SUMMARY_KEY),
        metric(
            "ad_sales",
            "Ad Sales",
            "sum(total_sales)",
            Visualization::currency(),
            "advertising",
        )
        .describe("Sales attributed to advertising")
        .cached(SUMMARY_TTL, SUMMARY_KEY),
        metric(
            "acos",
            "ACoS",
            "(sum(spend) / sum(total_sales)) * 100",
            Visualization::percentage(),
            "advertising",
        )
        .describe("Advertising cost of sale")
        .with_thresholds(30.0, 50.0, Direction::Asc),
        metric(
            "ctr",
            "Click-Through Rate",
            "(sum(clicks) / sum(impressions)) * 100",
            Visualization::percentage(),
            "advertising",
        )
        .describe("Clicks per impression"),
        metric(
            "roas",
            "ROAS",
            "sum(total_sales) / sum(spend)",
            Visualization::number(),
            "advertising",
        )
        .describe("Attributed sales per unit of spend")
        .with_thresholds(2.0, 1.0, Direction::Desc),
        metric(
            "total_impressions",
            "Impressions",
            "sum(impressions)",
            Visualization::number(),
            "advertising",
        ),
        metric(
            "total_clicks",
            "Clicks",
            "sum(clicks)",
            Visualization::number(),
            "advertising",
        ),
    ]
}

#[must_use]
pub fn inventory_metrics() -> Vec<MetricDefinition> {
    vec![
        metric(
            "total_afn_quantity",
            "AFN Units",
            "sum(afn_total_quantity)",
            Visualization::number(),
            "inventory",
        )
        .describe("Units held by Amazon fulfillment"),
        metric(
            "fulfillable_quantity",
            "Fulfillable Units",
            "sum(afn_fulfillable_quantity)",
            Visualization::number(),
            "inventory",
        ),
        metric(
            "unsellable_quantity",
            "Unsellable Units",
            "sum(afn_unsellable_quantity)",
            Visualization::number(),
            "inventory",
        ),
        MetricDefinition::new(
            "inventory_value",
            "Inventory Value",
            Formula::function(|rows, _| {
                let mut total = 0.0;
                for row in rows {
                    let price = numeric_value("price", row.get("price"))?;
                    let units =
                        numeric_value("afn_total_quantity", row.get("afn_total_quantity"))?;
                    total += price * units;
                }
                Ok(MetricValue::Number(total))
            }),
            Visualization::currency(),
        )
        .in_category("inventory")
        .describe("Listing price times AFN units, summed per row"),
    ]
}

#[must_use]
pub fn returns_metrics() -> Vec<MetricDefinition> {
    vec![
        metric(
            "total_returns",
            "Units Returned",
            "sum(quantity)",
            Visualization::number(),
            "returns",
        ),
        metric(
            "total_refunds",
            "Refunds",
            "sum(refund_amount)",
            Visualization::currency(),
            "returns",
        )
        .cached(SUMMARY_TTL, SUMMARY_KEY),
        metric(
            "average_refund",
            "Average Refund",
            "avg(refund_amount)",
            Visualization::currency(),
            "returns",
        ),
    ]
}

/// Built-in definitions for `report_type`.
#[must_use]
pub fn catalog_for(report_type: ReportType) -> Vec<MetricDefinition> {
    match report_type {
        ReportType::Business => business_metrics(),
        ReportType::Advertising => advertising_metrics(),
        ReportType::Inventory => inventory_metrics(),
        ReportType::Returns => returns_metrics(),
    }
}

/// Ids of the built-in metrics for `report_type`, in catalog order.
#[must_use]
pub fn default_metric_ids(report_type: ReportType) -> Vec<String> {
    catalog_for(report_type).into_iter().map(|m| m.id).collect()
}

/// Register every built-in metric.
///
/// # Errors
///
/// Returns [`MetricError::AlreadyRegistered`] if `registry` already holds a
/// different definition under a built-in id.
pub fn register_builtin_metrics(registry: &mut MetricRegistry) -> Result<(), MetricError> {
    for report_type in ReportType::ALL {
        for definition in catalog_for(report_type) {
            registry.register(definition)?;
        }
    }
    Ok(())
}

/// An engine holding exactly the built-in catalog.
///
/// # Errors
///
/// Returns an error if a built-in formula fails to parse.
pub fn builtin_engine() -> Result<MetricEngine, MetricError> {
    let mut registry = MetricRegistry::new();
    register_builtin_metrics(&mut registry)?;
    Ok(registry.freeze())
}
