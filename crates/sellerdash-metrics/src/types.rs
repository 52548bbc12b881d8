//! Metric definitions and results.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sellerdash_core::ReportRow;
use serde::Serialize;

use crate::error::MetricError;

/// Dimensions of one evaluation, e.g. `store_id` and `date_range`. Used for
/// cache keys.
pub type MetricContext = BTreeMap<String, String>;

/// A metric computed by code rather than by a textual expression.
pub type MetricFn =
    Arc<dyn Fn(&[ReportRow], &MetricContext) -> Result<MetricValue, MetricError> + Send + Sync>;

#[derive(Clone)]
pub enum Formula {
    /// Arithmetic over `sum`, `avg`, `count`, `min` and `max` of columns,
    /// e.g. `(sum(units_ordered) / sum(sessions)) * 100`.
    Expression(String),
    Function(MetricFn),
}

impl Formula {
    #[must_use]
    pub fn expression(text: impl Into<String>) -> Self {
        Formula::Expression(text.into())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[ReportRow], &MetricContext) -> Result<MetricValue, MetricError>
            + Send
            + Sync
            + 'static,
    {
        Formula::Function(Arc::new(f))
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Formula::Expression(a), Formula::Expression(b)) => a == b,
            (Formula::Function(a), Formula::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Expression(text) => f.debug_tuple("Expression").field(text).finish(),
            Formula::Function(_) => f.write_str("Function(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Currency,
    Percentage,
    Number,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visualization {
    pub kind: VisualizationKind,
    /// Display pattern for front ends, e.g. `$0,0.00`. Not interpreted here.
    pub format: String,
}

impl Visualization {
    #[must_use]
    pub fn currency() -> Self {
        Self {
            kind: VisualizationKind::Currency,
            format: "$0,0.00".to_string(),
        }
    }

    #[must_use]
    pub fn percentage() -> Self {
        Self {
            kind: VisualizationKind::Percentage,
            format: "0.00%".to_string(),
        }
    }

    #[must_use]
    pub fn number() -> Self {
        Self {
            kind: VisualizationKind::Number,
            format: "0,0".to_string(),
        }
    }

    #[must_use]
    pub fn custom(format: impl Into<String>) -> Self {
        Self {
            kind: VisualizationKind::Custom,
            format: format.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Higher values are worse.
    Asc,
    /// Lower values are worse.
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachingPolicy {
    pub ttl: Duration,
    /// Context entries that distinguish cache entries.
    pub key_fields: Vec<String>,
}

/// Severity ordering: `Normal < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for ThresholdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdLevel::Normal => "normal",
            ThresholdLevel::Warning => "warning",
            ThresholdLevel::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub formula: Formula,
    pub category: String,
    pub visualization: Visualization,
    pub thresholds: Option<Thresholds>,
    pub caching: Option<CachingPolicy>,
    /// Evaluate the formula once per distinct value of this column.
    pub group_by: Option<String>,
    /// Keep only the top `limit` groups by value.
    pub limit: Option<usize>,
}

impl MetricDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        formula: Formula,
        visualization: Visualization,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            formula,
            category: String::new(),
            visualization,
            thresholds: None,
            caching: None,
            group_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, warning: f64, critical: f64, direction: Direction) -> Self {
        self.thresholds = Some(Thresholds {
            warning,
            critical,
            direction,
        });
        self
    }

    #[must_use]
    pub fn cached(mut self, ttl: Duration, key_fields: &[&str]) -> Self {
        self.caching = Some(CachingPolicy {
            ttl,
            key_fields: key_fields.iter().map(ToString::to_string).collect(),
        });
        self
    }

    #[must_use]
    pub fn grouped_by(mut self, column: impl Into<String>, limit: Option<usize>) -> Self {
        self.group_by = Some(column.into());
        self.limit = limit;
        self
    }
}

/// A raw metric value: a single number, or one number per group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    /// In key order, or by descending value when the metric has a limit.
    Grouped(Vec<(String, f64)>),
}

impl MetricValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Grouped(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub metric_id: String,
    pub raw_value: MetricValue,
    /// For grouped values, `key: value` pairs joined with `, `.
    pub formatted_value: String,
    /// Per-group formatted values; empty for scalar metrics.
    pub formatted_groups: Vec<(String, String)>,
    pub threshold_level: ThresholdLevel,
}
