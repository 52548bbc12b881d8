//! Declarative metrics over persisted report rows.
//!
//! Build a [`MetricRegistry`], register definitions (the built-in catalog
//! lives in [`catalog`]), then [`MetricRegistry::freeze`] it into a
//! [`MetricEngine`] to evaluate, format and classify metrics.

pub mod anomaly;
pub mod cache;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod expression;
pub mod format;
pub mod threshold;
pub mod types;

pub use anomaly::{
    compare_periods, default_drop_thresholds, detect_anomalies, previous_period, raw_numbers,
    DropThresholds, PeriodChange,
};
pub use cache::MetricCache;
pub use catalog::{builtin_engine, catalog_for, default_metric_ids, register_builtin_metrics};
pub use engine::{MetricEngine, MetricRegistry};
pub use error::MetricError;
pub use format::format_value;
pub use threshold::classify;
pub use types::{
    CachingPolicy, Direction, Formula, MetricContext, MetricDefinition, MetricFn, MetricResult,
    MetricValue, ThresholdLevel, Thresholds, Visualization, VisualizationKind,
};
