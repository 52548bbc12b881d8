use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::SchemaDescriptor;
use crate::value::Value;

/// The lookup key for a report row: `store_id` plus the descriptor's
/// natural-key values in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub store_id: i64,
    pub values: Vec<Value>,
}

impl NaturalKey {
    /// Build the key for `values` under `descriptor`.
    ///
    /// Returns `None` when any key column is missing or null.
    #[must_use]
    pub fn from_values(
        descriptor: &SchemaDescriptor,
        store_id: i64,
        values: &BTreeMap<String, Value>,
    ) -> Option<Self> {
        let parts = descriptor
            .natural_key
            .iter()
            .map(|column| match values.get(*column) {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.clone()),
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            store_id,
            values: parts,
        })
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.values.iter().map(ToString::to_string).collect();
        write!(f, "store {} [{}]", self.store_id, parts.join(", "))
    }
}

/// A row that passed coercion and semantic validation, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedRow {
    /// 1-based data-row index within the source file.
    pub row_index: usize,
    pub store_id: i64,
    pub values: BTreeMap<String, Value>,
}

impl TypedRow {
    #[must_use]
    pub fn natural_key(&self, descriptor: &SchemaDescriptor) -> Option<NaturalKey> {
        NaturalKey::from_values(descriptor, self.store_id, &self.values)
    }
}

/// A persisted report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub store_id: i64,
    pub values: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportRow {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    #[must_use]
    pub fn natural_key(&self, descriptor: &SchemaDescriptor) -> Option<NaturalKey> {
        NaturalKey::from_values(descriptor, self.store_id, &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::report_type::ReportType;
    use chrono::NaiveDate;

    fn business_values(sku: &str) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        values.insert("store_id".into(), Value::Int(1));
        values.insert(
            "date".into(),
            Value::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
        );
        values.insert("sku".into(), Value::from(sku));
        values.insert("asin".into(), Value::from("B000000001"));
        values
    }

    #[test]
    fn key_uses_declared_order_and_store() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
        let key = NaturalKey::from_values(descriptor, 1, &business_values("SKU1")).unwrap();
        assert_eq!(key.store_id, 1);
        assert_eq!(key.values[1], Value::from("SKU1"));
        assert_eq!(key.values.len(), 3);
        assert_eq!(key.to_string(), "store 1 [2025-01-01, SKU1, B000000001]");
    }

    #[test]
    fn null_key_column_yields_no_key() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
        let mut values = business_values("SKU1");
        values.insert("sku".into(), Value::Null);
        assert!(NaturalKey::from_values(descriptor, 1, &values).is_none());
        values.remove("sku");
        assert!(NaturalKey::from_values(descriptor, 1, &values).is_none());
    }

    #[test]
    fn keys_differ_by_store() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
        let values = business_values("SKU1");
        let a = NaturalKey::from_values(descriptor, 1, &values).unwrap();
        let b = NaturalKey::from_values(descriptor, 2, &values).unwrap();
        assert_ne!(a, b);
    }
}
