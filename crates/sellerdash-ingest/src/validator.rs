//! Applies a [`SchemaDescriptor`] to a raw chunk.
//!
//! Row-level problems never abort the chunk: each rejected row is recorded
//! as a [`RowError`] and counted in [`RejectionCounts`].

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use sellerdash_core::{
    coerce, CoercionError, NaturalKey, RejectionCounts, SchemaDescriptor, TypedRow, Value,
    STORE_ID_COLUMN,
};

use crate::error::{RowError, RowErrorKind};
use crate::reader::{RawRow, RowChunk};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedChunk {
    /// Rows that passed every check, in source order.
    pub rows: Vec<TypedRow>,
    pub errors: Vec<RowError>,
    pub counts: RejectionCounts,
}

/// Coerce a single raw row. Collects one error per offending cell.
fn coerce_row(
    raw: &RawRow,
    descriptor: &SchemaDescriptor,
) -> Result<BTreeMap<String, Value>, Vec<RowError>> {
    let mut values = BTreeMap::new();
    let mut errors = Vec::new();

    for column in &descriptor.columns {
        match coerce(raw.get(column.name), column.semantic_type) {
            Ok(value) => {
                values.insert(column.name.to_string(), value);
            }
            Err(CoercionError::Empty) if !column.required => {
                values.insert(column.name.to_string(), Value::Null);
            }
            Err(err) => {
                let message = match err {
                    CoercionError::Empty => "required value is missing".to_string(),
                    other => other.to_string(),
                };
                errors.push(RowError {
                    row_index: raw.row_index,
                    column: Some(column.name.to_string()),
                    kind: RowErrorKind::InvalidValue,
                    message,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn rule_errors(
    row_index: usize,
    values: &BTreeMap<String, Value>,
    descriptor: &SchemaDescriptor,
    today: NaiveDate,
) -> Vec<RowError> {
    descriptor
        .semantic_rules
        .iter()
        .filter(|rule| !rule.holds(values, today))
        .map(|rule| RowError {
            row_index,
            column: None,
            kind: RowErrorKind::RuleViolation,
            message: rule.message.clone(),
        })
        .collect()
}

/// Validate one chunk against `descriptor`, with `today` as the upper bound
/// for date rules.
///
/// Steps: coerce every cell; evaluate semantic rules on cleanly coerced
/// rows; then drop every row whose natural key occurs more than once in
/// the chunk.
#[must_use]
pub fn validate_chunk(
    chunk: &RowChunk,
    descriptor: &SchemaDescriptor,
    today: NaiveDate,
) -> ValidatedChunk {
    let mut result = ValidatedChunk::default();
    let mut candidates: Vec<(TypedRow, NaturalKey)> = Vec::with_capacity(chunk.rows.len());

    for raw in &chunk.rows {
        let values = match coerce_row(raw, descriptor) {
            Ok(values) => values,
            Err(errors) => {
                result.counts.rejected_for_coercion += 1;
                result.errors.extend(errors);
                continue;
            }
        };

        let violations = rule_errors(raw.row_index, &values, descriptor, today);
        if !violations.is_empty() {
            result.counts.rejected_for_rules += 1;
            result.errors.extend(violations);
            continue;
        }

        let store_id = values.get(STORE_ID_COLUMN).and_then(Value::as_i64);
        let key = store_id.and_then(|id| NaturalKey::from_values(descriptor, id, &values));
        let (Some(store_id), Some(key)) = (store_id, key) else {
            result.counts.rejected_for_coercion += 1;
            result.errors.push(RowError {
                row_index: raw.row_index,
                column: None,
                kind: RowErrorKind::InvalidValue,
                message: "natural key columns must not be empty".to_string(),
            });
            continue;
        };

        candidates.push((
            TypedRow {
                row_index: raw.row_index,
                store_id,
                values,
            },
            key,
        ));
    }

    let mut occurrences: HashMap<&NaturalKey, Vec<usize>> = HashMap::new();
    for (row, key) in &candidates {
        occurrences.entry(key).or_default().push(row.row_index);
    }

    let mut duplicate_rows = Vec::new();
    for (row, key) in &candidates {
        let rows = &occurrences[key];
        if rows.len() > 1 {
            duplicate_rows.push(RowError {
                row_index: row.row_index,
                column: None,
                kind: RowErrorKind::DuplicateKey,
                message: format!(
                    "natural key {key} appears on rows {}",
                    rows.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
    }

    let duplicate_indexes: HashSet<usize> = duplicate_rows.iter().map(|e| e.row_index).collect();
    result.counts.rejected_for_duplicate += duplicate_rows.len() as u64;
    result.errors.extend(duplicate_rows);
    result.rows = candidates
        .into_iter()
        .map(|(row, _)| row)
        .filter(|row| !duplicate_indexes.contains(&row.row_index))
        .collect();
    result.counts.accepted = result.rows.len() as u64;
    result.errors.sort_by_key(|e| e.row_index);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sellerdash_core::{ReportType, TypeRegistry};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn business_row(index: usize, overrides: &[(&str, &str)]) -> RawRow {
        let mut cells: BTreeMap<String, String> = [
            ("store_id", "1"),
            ("date", "2025-01-01"),
            ("sku", "SKU1"),
            ("asin", "B000000001"),
            ("title", "Title"),
            ("sessions", "100"),
            ("units_ordered", "10"),
            ("ordered_product_sales", "$500.00"),
            ("total_order_items", "15"),
            ("conversion_rate", "0.15"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in overrides {
            cells.insert((*k).to_string(), (*v).to_string());
        }
        RawRow {
            row_index: index,
            cells,
        }
    }

    fn raw_row(index: usize, base: &[(&str, &str)], overrides: &[(&str, &str)]) -> RawRow {
        let mut cells: BTreeMap<String, String> = base
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        for (k, v) in overrides {
            cells.insert((*k).to_string(), (*v).to_string());
        }
        RawRow {
            row_index: index,
            cells,
        }
    }

    const RETURNS_ROW: &[(&str, &str)] = &[
        ("store_id", "1"),
        ("return_date", "2025-01-05"),
        ("order_id", "111-1234567-1234567"),
        ("sku", "SKU1"),
        ("asin", "B000000001"),
        ("title", "Widget"),
        ("quantity", "1"),
        ("return_reason", "Defective"),
        ("status", "Approved"),
        ("refund_amount", "19.99"),
        ("return_center", "FBA"),
        ("return_carrier", "UPS"),
        ("tracking_number", "1Z999AA10123456784"),
    ];

    const ADVERTISING_ROW: &[(&str, &str)] = &[
        ("store_id", "1"),
        ("date", "2025-01-01"),
        ("campaign_name", "Camp"),
        ("ad_group_name", "Group"),
        ("targeting_type", "manual"),
        ("match_type", "exact"),
        ("search_term", "boots"),
        ("impressions", "1000"),
        ("clicks", "100"),
        ("ctr", "10.0"),
        ("cpc", "0.50"),
        ("spend", "50.00"),
        ("total_sales", "100.00"),
        ("acos", "50.0"),
        ("total_orders", "10"),
        ("total_units", "12"),
        ("conversion_rate", "0.10"),
    ];

    fn validate_as(report_type: ReportType, row: RawRow) -> ValidatedChunk {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(report_type).unwrap();
        validate_chunk(&chunk(vec![row]), descriptor, today())
    }

    fn assert_rule_rejects(
        report_type: ReportType,
        base: &[(&str, &str)],
        cases: &[(&str, &str, &str)],
    ) {
        for (column, value, message) in cases {
            let result = validate_as(report_type, raw_row(1, base, &[(*column, *value)]));
            assert_eq!(result.counts.rejected_for_rules, 1, "{column}={value}");
            assert!(result.rows.is_empty(), "{column}={value}");
            assert_eq!(result.errors[0].kind, RowErrorKind::RuleViolation);
            assert!(
                result.errors[0].message.starts_with(*message),
                "{column}={value}: {}",
                result.errors[0].message
            );
        }
    }

    fn assert_accepts(report_type: ReportType, base: &[(&str, &str)], cases: &[(&str, &str)]) {
        for (column, value) in cases {
            let result = validate_as(report_type, raw_row(1, base, &[(*column, *value)]));
            assert_eq!(result.counts.accepted, 1, "{column}={value}: {:?}", result.errors);
        }
    }

    fn chunk(rows: Vec<RawRow>) -> RowChunk {
        RowChunk { index: 0, rows }
    }

    fn validate(rows: Vec<RawRow>) -> ValidatedChunk {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
        validate_chunk(&chunk(rows), descriptor, today())
    }

    #[test]
    fn accepts_clean_rows_with_typed_values() {
        let result = validate(vec![
            business_row(1, &[]),
            business_row(2, &[("sku", "SKU2"), ("ordered_product_sales", "$1,000.00")]),
        ]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.counts.accepted, 2);
        assert_eq!(
            result.rows[0].values["ordered_product_sales"],
            Value::Decimal(Decimal::new(50_000, 2))
        );
        assert_eq!(result.rows[0].store_id, 1);
    }

    #[test]
    fn coercion_failure_skips_row_and_names_column() {
        let result = validate(vec![
            business_row(1, &[("sessions", "lots")]),
            business_row(2, &[("sku", "SKU2")]),
        ]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.counts.rejected_for_coercion, 1);
        assert_eq!(result.errors[0].kind, RowErrorKind::InvalidValue);
        assert_eq!(result.errors[0].column.as_deref(), Some("sessions"));
        assert_eq!(result.errors[0].row_index, 1);
    }

    #[test]
    fn missing_required_cell_is_invalid_value() {
        let result = validate(vec![business_row(4, &[("asin", "  ")])]);
        assert_eq!(result.counts.rejected_for_coercion, 1);
        assert_eq!(result.errors[0].message, "required value is missing");
    }

    #[test]
    fn rule_violation_skips_row() {
        let result = validate(vec![business_row(1, &[("units_ordered", "20")])]);
        assert!(result.rows.is_empty());
        assert_eq!(result.counts.rejected_for_rules, 1);
        assert_eq!(result.errors[0].kind, RowErrorKind::RuleViolation);
    }

    #[test]
    fn future_date_is_a_rule_violation() {
        let result = validate(vec![business_row(1, &[("date", "2025-06-02")])]);
        assert_eq!(result.counts.rejected_for_rules, 1);
        let today_row = validate(vec![business_row(1, &[("date", "2025-06-01")])]);
        assert_eq!(today_row.counts.accepted, 1);
    }

    #[test]
    fn duplicate_keys_reject_every_occurrence() {
        let result = validate(vec![
            business_row(1, &[]),
            business_row(2, &[("title", "Other")]),
            business_row(3, &[("sku", "SKU3")]),
        ]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].row_index, 3);
        assert_eq!(result.counts.rejected_for_duplicate, 2);
        let duplicate_rows: Vec<usize> = result
            .errors
            .iter()
            .filter(|e| e.kind == RowErrorKind::DuplicateKey)
            .map(|e| e.row_index)
            .collect();
        assert_eq!(duplicate_rows, vec![1, 2]);
    }

    #[test]
    fn same_key_in_different_stores_is_not_a_duplicate() {
        let result = validate(vec![business_row(1, &[]), business_row(2, &[("store_id", "2")])]);
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn rejected_rows_do_not_count_toward_duplicates() {
        let result = validate(vec![
            business_row(1, &[("sessions", "x")]),
            business_row(2, &[]),
        ]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.counts.rejected_for_duplicate, 0);
    }

    #[test]
    fn inventory_component_sum_is_enforced() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Inventory).unwrap();
        let row = |index: usize, total: &str| RawRow {
            row_index: index,
            cells: [
                ("store_id", "1"),
                ("date", "2025-01-01"),
                ("sku", "SKU1"),
                ("asin", "B000000001"),
                ("product_name", "Widget"),
                ("condition", "New"),
                ("price", "19.99"),
                ("mfn_listing_exists", "no"),
                ("mfn_fulfillable_quantity", "0"),
                ("afn_listing_exists", "yes"),
                ("afn_warehouse_quantity", "50"),
                ("afn_fulfillable_quantity", "45"),
                ("afn_unsellable_quantity", "2"),
                ("afn_reserved_quantity", "3"),
                ("afn_total_quantity", total),
                ("per_unit_volume", "0.5"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        };
        let ok = validate_chunk(&chunk(vec![row(1, "100")]), descriptor, today());
        assert_eq!(ok.counts.accepted, 1);
        let bad = validate_chunk(&chunk(vec![row(1, "99")]), descriptor, today());
        assert_eq!(bad.counts.rejected_for_rules, 1);
    }

    #[test]
    fn clean_returns_row_is_accepted() {
        let result = validate_as(ReportType::Returns, raw_row(1, RETURNS_ROW, &[]));
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.rows[0].values["status"], Value::from("Approved"));
        assert_eq!(result.rows[0].values["quantity"], Value::Int(1));
    }

    #[test]
    fn returns_rules_reject_out_of_policy_rows() {
        assert_rule_rejects(
            ReportType::Returns,
            RETURNS_ROW,
            &[
                ("status", "Lost", "status must be one of"),
                ("return_center", "AMZ-SEA-09", "return_center must be one of"),
                ("return_carrier", "DHL", "return_carrier must be one of"),
                ("tracking_number", "AB123", "tracking_number must start with one of"),
                ("quantity", "0", "quantity must be greater than 0"),
                ("quantity", "-2", "quantity must be greater than 0"),
                ("refund_amount", "-1.00", "refund_amount cannot be negative"),
                ("return_date", "2025-06-02", "return_date cannot be in the future"),
            ],
        );
    }

    #[test]
    fn returns_rules_accept_every_policy_value() {
        assert_accepts(
            ReportType::Returns,
            RETURNS_ROW,
            &[
                ("status", "Pending"),
                ("status", "Completed"),
                ("return_center", "AMZ-CHI-03"),
                ("return_carrier", "Amazon Logistics"),
                ("tracking_number", "TBA000111222"),
                ("tracking_number", "9400100000000000000000"),
                ("refund_amount", "0"),
            ],
        );
    }

    #[test]
    fn advertising_rules_reject_inconsistent_rows() {
        assert_rule_rejects(
            ReportType::Advertising,
            ADVERTISING_ROW,
            &[
                ("clicks", "1001", "clicks cannot exceed impressions"),
                ("ctr", "100.5", "ctr must be between 0 and 100"),
                ("ctr", "-0.1", "ctr must be between 0 and 100"),
                ("total_units", "9", "total_units cannot be less than total_orders"),
                ("acos", "-0.1", "acos cannot be negative"),
                ("conversion_rate", "1.5", "conversion_rate must be between 0 and 1"),
            ],
        );
    }

    #[test]
    fn advertising_rules_accept_boundaries() {
        assert_accepts(
            ReportType::Advertising,
            ADVERTISING_ROW,
            &[
                ("ctr", "100"),
                ("ctr", "0"),
                ("clicks", "1000"),
                ("total_units", "10"),
                ("acos", "0"),
                ("acos", "12345678"),
            ],
        );
    }

    #[test]
    fn many_duplicates_in_a_large_chunk_are_all_rejected() {
        let rows: Vec<RawRow> = (1..=10_000)
            .map(|i| {
                let sku = format!("SKU{}", i / 2);
                business_row(i, &[("sku", sku.as_str())])
            })
            .collect();
        let result = validate(rows);
        // Row 1 holds SKU0 alone and row 10000 holds SKU5000 alone.
        assert_eq!(result.counts.accepted, 2);
        assert_eq!(result.counts.rejected_for_duplicate, 9_998);
    }
}
