use serde::{Deserialize, Serialize};

use crate::report_type::ReportType;
use crate::rules::SemanticRule;

/// Every report carries the owning store in this column.
pub const STORE_ID_COLUMN: &str = "store_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Int,
    Decimal,
    Date,
    Bool,
    String,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SemanticType::Int => "int",
            SemanticType::Decimal => "decimal",
            SemanticType::Date => "date",
            SemanticType::Bool => "bool",
            SemanticType::String => "string",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub semantic_type: SemanticType,
    pub required: bool,
    pub description: &'static str,
}

impl ColumnSpec {
    #[must_use]
    pub const fn required(
        name: &'static str,
        semantic_type: SemanticType,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            semantic_type,
            required: true,
            description,
        }
    }
}

/// Everything needed to validate, coerce, and key rows of one report type.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    pub report_type: ReportType,
    /// Columns in template order.
    pub columns: Vec<ColumnSpec>,
    /// Columns that, together with `store_id`, identify a row.
    pub natural_key: Vec<&'static str>,
    pub semantic_rules: Vec<SemanticRule>,
    /// When set, the CSV header must list exactly `columns` in this order.
    pub order_significant: bool,
    /// Date column used for range queries.
    pub date_column: &'static str,
}

impl SchemaDescriptor {
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }

    #[must_use]
    pub fn is_key_column(&self, name: &str) -> bool {
        name == STORE_ID_COLUMN || self.natural_key.contains(&name)
    }

    /// Columns updated in place when an existing row is re-uploaded.
    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !self.is_key_column(c.name))
    }

    #[must_use]
    pub fn table_name(&self) -> &'static str {
        self.report_type.table_name()
    }
}
