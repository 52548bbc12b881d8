//! The static catalog of report schemas.
//!
//! Built once at startup from a [`ReturnsPolicy`] and immutable afterwards.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::report_type::ReportType;
use crate::rules::{RuleCheck, SemanticRule};
use crate::schema::SemanticType::{Bool, Date, Decimal as Dec, Int, String as Str};
use crate::schema::{ColumnSpec, SchemaDescriptor, SemanticType, STORE_ID_COLUMN};
use crate::CoreError;

pub const DEFAULT_RETURN_CENTERS: &[&str] = &["FBA", "AMZ-NYC-01", "AMZ-LAX-02", "AMZ-CHI-03"];
pub const DEFAULT_RETURN_CARRIERS: &[&str] = &["Amazon Logistics", "UPS", "FedEx", "USPS"];
pub const DEFAULT_TRACKING_PREFIXES: &[&str] = &["TBA", "1Z", "7", "9"];

pub const RETURN_STATUSES: &[&str] = &["Pending", "Approved", "Rejected", "Completed"];

/// Closed sets used by the returns rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnsPolicy {
    pub return_centers: Vec<String>,
    pub return_carriers: Vec<String>,
    pub tracking_prefixes: Vec<String>,
}

impl Default for ReturnsPolicy {
    fn default() -> Self {
        Self {
            return_centers: to_owned(DEFAULT_RETURN_CENTERS),
            return_carriers: to_owned(DEFAULT_RETURN_CARRIERS),
            tracking_prefixes: to_owned(DEFAULT_TRACKING_PREFIXES),
        }
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    descriptors: BTreeMap<ReportType, SchemaDescriptor>,
}

impl TypeRegistry {
    /// Registry holding the four Seller Central report schemas.
    #[must_use]
    pub fn standard(policy: &ReturnsPolicy) -> Self {
        let descriptors = [
            business_descriptor(),
            advertising_descriptor(),
            inventory_descriptor(),
            returns_descriptor(policy),
        ]
        .into_iter()
        .map(|d| (d.report_type, d))
        .collect();
        Self { descriptors }
    }

    /// # Errors
    ///
    /// Returns [`CoreError::UnknownReportType`] if no descriptor is registered.
    pub fn descriptor_for(&self, report_type: ReportType) -> Result<&SchemaDescriptor, CoreError> {
        self.descriptors
            .get(&report_type)
            .ok_or_else(|| CoreError::UnknownReportType(report_type.to_string()))
    }

    /// Look a descriptor up by any accepted report-type spelling.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownReportType`] for unrecognised names.
    pub fn descriptor_by_name(&self, name: &str) -> Result<&SchemaDescriptor, CoreError> {
        let report_type: ReportType = name.parse()?;
        self.descriptor_for(report_type)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SchemaDescriptor> {
        self.descriptors.values()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard(&ReturnsPolicy::default())
    }
}

const fn col(name: &'static str, semantic_type: SemanticType, description: &'static str) -> ColumnSpec {
    ColumnSpec::required(name, semantic_type, description)
}

fn not_after_today(column: &'static str) -> SemanticRule {
    SemanticRule::new(
        "not_in_future",
        format!("{column} cannot be in the future"),
        RuleCheck::NotAfterToday { column },
    )
}

fn non_negative(column: &'static str) -> SemanticRule {
    SemanticRule::new(
        "non_negative",
        format!("{column} cannot be negative"),
        RuleCheck::AtLeast {
            column,
            min: Decimal::ZERO,
        },
    )
}

fn unit_interval(column: &'static str) -> SemanticRule {
    SemanticRule::new(
        "unit_interval",
        format!("{column} must be between 0 and 1"),
        RuleCheck::Between {
            column,
            min: Decimal::ZERO,
            max: Decimal::ONE,
        },
    )
}

fn business_descriptor() -> SchemaDescriptor {
    SchemaDescriptor {
        report_type: ReportType::Business,
        columns: vec![
            col(STORE_ID_COLUMN, Int, "Store identifier"),
            col("date", Date, "Report date (YYYY-MM-DD)"),
            col("sku", Str, "Merchant SKU"),
            col("asin", Str, "Amazon ASIN"),
            col("title", Str, "Product title"),
            col("sessions", Int, "Number of sessions"),
            col("units_ordered", Int, "Units ordered"),
            col("ordered_product_sales", Dec, "Ordered product sales"),
            col("total_order_items", Int, "Total order items"),
            col("conversion_rate", Dec, "Unit session percentage as a fraction"),
        ],
        natural_key: vec!["date", "sku", "asin"],
        semantic_rules: vec![
            not_after_today("date"),
            SemanticRule::new(
                "units_within_order_items",
                "units_ordered cannot exceed total_order_items",
                RuleCheck::LessOrEqual {
                    left: "units_ordered",
                    right: "total_order_items",
                },
            ),
            unit_interval("conversion_rate"),
            non_negative("units_ordered"),
            non_negative("sessions"),
            non_negative("ordered_product_sales"),
        ],
        order_significant: false,
        date_column: "date",
    }
}

fn advertising_descriptor() -> SchemaDescriptor {
    SchemaDescriptor {
        report_type: ReportType::Advertising,
        columns: vec![
            col(STORE_ID_COLUMN, Int, "Store identifier"),
            col("date", Date, "Report date (YYYY-MM-DD)"),
            col("campaign_name", Str, "Campaign name"),
            col("ad_group_name", Str, "Ad group name"),
            col("targeting_type", Str, "Targeting type"),
            col("match_type", Str, "Match type"),
            col("search_term", Str, "Customer search term"),
            col("impressions", Int, "Impressions"),
            col("clicks", Int, "Clicks"),
            col("ctr", Dec, "Click-through rate in percent"),
            col("cpc", Dec, "Cost per click"),
            col("spend", Dec, "Ad spend"),
            col("total_sales", Dec, "Attributed sales"),
            col("acos", Dec, "Advertising cost of sale"),
            col("total_orders", Int, "Attributed orders"),
            col("total_units", Int, "Attributed units"),
            col("conversion_rate", Dec, "Conversion rate as a fraction"),
        ],
        natural_key: vec![
            "date",
            "campaign_name",
            "ad_group_name",
            "targeting_type",
            "search_term",
        ],
        semantic_rules: vec![
            not_after_today("date"),
            SemanticRule::new(
                "clicks_within_impressions",
                "clicks cannot exceed impressions",
                RuleCheck::LessOrEqual {
                    left: "clicks",
                    right: "impressions",
                },
            ),
            SemanticRule::new(
                "ctr_percent_range",
                "ctr must be between 0 and 100",
                RuleCheck::Between {
                    column: "ctr",
                    min: Decimal::ZERO,
                    max: Decimal::ONE_HUNDRED,
                },
            ),
            unit_interval("conversion_rate"),
            non_negative("acos"),
            SemanticRule::new(
                "orders_within_units",
                "total_units cannot be less than total_orders",
                RuleCheck::LessOrEqual {
                    left: "total_orders",
                    right: "total_units",
                },
            ),
            non_negative("spend"),
            non_negative("total_sales"),
        ],
        order_significant: true,
        date_column: "date",
    }
}

const AFN_COMPONENTS: [&str; 4] = [
    "afn_warehouse_quantity",
    "afn_fulfillable_quantity",
    "afn_unsellable_quantity",
    "afn_reserved_quantity",
];

fn inventory_descriptor() -> SchemaDescriptor {
    let mut semantic_rules = vec![
        not_after_today("date"),
        non_negative("price"),
        SemanticRule::new(
            "positive_volume",
            "per_unit_volume must be greater than 0",
            RuleCheck::GreaterThan {
                column: "per_unit_volume",
                min: Decimal::ZERO,
            },
        ),
    ];
    semantic_rules.extend(AFN_COMPONENTS.into_iter().map(non_negative));
    semantic_rules.push(non_negative("afn_total_quantity"));
    semantic_rules.push(SemanticRule::new(
        "afn_total_matches_components",
        "afn_total_quantity must equal the sum of warehouse, fulfillable, unsellable and reserved quantities",
        RuleCheck::SumEquals {
            total: "afn_total_quantity",
            parts: AFN_COMPONENTS.to_vec(),
        },
    ));

    SchemaDescriptor {
        report_type: ReportType::Inventory,
        columns: vec![
            col(STORE_ID_COLUMN, Int, "Store identifier"),
            col("date", Date, "Snapshot date (YYYY-MM-DD)"),
            col("sku", Str, "Merchant SKU"),
            col("asin", Str, "Amazon ASIN"),
            col("product_name", Str, "Product name"),
            col("condition", Str, "Item condition"),
            col("price", Dec, "Listing price"),
            col("mfn_listing_exists", Bool, "Merchant-fulfilled listing exists"),
            col("mfn_fulfillable_quantity", Int, "Merchant-fulfilled quantity"),
            col("afn_listing_exists", Bool, "Amazon-fulfilled listing exists"),
            col("afn_warehouse_quantity", Int, "AFN warehouse quantity"),
            col("afn_fulfillable_quantity", Int, "AFN fulfillable quantity"),
            col("afn_unsellable_quantity", Int, "AFN unsellable quantity"),
            col("afn_reserved_quantity", Int, "AFN reserved quantity"),
            col("afn_total_quantity", Int, "AFN total quantity"),
            col("per_unit_volume", Dec, "Volume per unit"),
        ],
        natural_key: vec!["date", "sku", "asin"],
        semantic_rules,
        order_significant: true,
        date_column: "date",
    }
}

fn returns_descriptor(policy: &ReturnsPolicy) -> SchemaDescriptor {
    SchemaDescriptor {
        report_type: ReportType::Returns,
        columns: vec![
            col(STORE_ID_COLUMN, Int, "Store identifier"),
            col("return_date", Date, "Return date (YYYY-MM-DD)"),
            col("order_id", Str, "Amazon order id"),
            col("sku", Str, "Merchant SKU"),
            col("asin", Str, "Amazon ASIN"),
            col("title", Str, "Product title"),
            col("quantity", Int, "Units returned"),
            col("return_reason", Str, "Customer return reason"),
            col("status", Str, "Return status"),
            col("refund_amount", Dec, "Refunded amount"),
            col("return_center", Str, "Receiving return center"),
            col("return_carrier", Str, "Return shipment carrier"),
            col("tracking_number", Str, "Carrier tracking number"),
        ],
        natural_key: vec!["return_date", "order_id", "sku"],
        semantic_rules: vec![
            not_after_today("return_date"),
            SemanticRule::new(
                "positive_quantity",
                "quantity must be greater than 0",
                RuleCheck::GreaterThan {
                    column: "quantity",
                    min: Decimal::ZERO,
                },
            ),
            non_negative("refund_amount"),
            SemanticRule::new(
                "known_status",
                format!("status must be one of {}", RETURN_STATUSES.join(", ")),
                RuleCheck::OneOf {
                    column: "status",
                    allowed: to_owned(RETURN_STATUSES),
                },
            ),
            SemanticRule::new(
                "known_return_center",
                format!(
                    "return_center must be one of {}",
                    policy.return_centers.join(", ")
                ),
                RuleCheck::OneOf {
                    column: "return_center",
                    allowed: policy.return_centers.clone(),
                },
            ),
            SemanticRule::new(
                "known_return_carrier",
                format!(
                    "return_carrier must be one of {}",
                    policy.return_carriers.join(", ")
                ),
                RuleCheck::OneOf {
                    column: "return_carrier",
                    allowed: policy.return_carriers.clone(),
                },
            ),
            SemanticRule::new(
                "tracking_prefix",
                format!(
                    "tracking_number must start with one of {}",
                    policy.tracking_prefixes.join(", ")
                ),
                RuleCheck::StartsWithAny {
                    column: "tracking_number",
                    prefixes: policy.tracking_prefixes.clone(),
                },
            ),
        ],
        order_significant: true,
        date_column: "return_date",
    }
}
