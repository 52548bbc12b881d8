//! Metric registration and evaluation.
//!
//! Definitions are collected in a [`MetricRegistry`] at start-up and frozen
//! into a [`MetricEngine`], which is immutable apart from its result cache
//! and can be shared across tasks behind an `Arc`.

use std::collections::BTreeMap;
use std::time::Instant;

use sellerdash_core::ReportRow;

use crate::cache::{cache_key, fingerprint, MetricCache};
use crate::error::MetricError;
use crate::expression::{self, Expr};
use crate::format::{format_value, zero_for};
use crate::threshold::classify;
use crate::types::{
    Formula, MetricContext, MetricDefinition, MetricFn, MetricResult, MetricValue, ThresholdLevel,
};

enum Compiled {
    Expression(Expr),
    Function(MetricFn),
}

struct RegisteredMetric {
    definition: MetricDefinition,
    compiled: Compiled,
}

impl RegisteredMetric {
    fn evaluate_scalar(
        &self,
        rows: &[ReportRow],
        context: &MetricContext,
    ) -> Result<f64, MetricError> {
        match &self.compiled {
            Compiled::Expression(expr) => expr.evaluate(rows),
            Compiled::Function(f) => match f(rows, context)? {
                MetricValue::Number(n) => Ok(n),
                MetricValue::Grouped(_) => Err(MetricError::Evaluation {
                    metric_id: self.definition.id.clone(),
                    reason: "grouped metric formula returned a mapping for one group".to_string(),
                }),
            },
        }
    }

    fn evaluate(
        &self,
        rows: &[ReportRow],
        context: &MetricContext,
    ) -> Result<MetricValue, MetricError> {
        let Some(column) = self.definition.group_by.as_deref() else {
            return match &self.compiled {
                Compiled::Expression(expr) => expr.evaluate(rows).map(MetricValue::Number),
                Compiled::Function(f) => f(rows, context),
            };
        };

        let mut groups: BTreeMap<String, Vec<ReportRow>> = BTreeMap::new();
        for row in rows {
            let key = row.get(column).map(ToString::to_string).unwrap_or_default();
            groups.entry(key).or_default().push(row.clone());
        }

        let mut values = Vec::with_capacity(groups.len());
        for (key, group_rows) in groups {
            let value = self.evaluate_scalar(&group_rows, context)?;
            values.push((key, value));
        }
        if let Some(limit) = self.definition.limit {
            // Stable sort keeps key order among equal values.
            values.sort_by(|a, b| b.1.total_cmp(&a.1));
            values.truncate(limit);
        }
        Ok(MetricValue::Grouped(values))
    }

    fn result(&self, raw_value: MetricValue) -> MetricResult {
        let kind = self.definition.visualization.kind;
        let (formatted_value, formatted_groups, threshold_level) = match &raw_value {
            MetricValue::Number(n) => (
                format_value(*n, kind),
                Vec::new(),
                classify(*n, self.definition.thresholds.as_ref()),
            ),
            MetricValue::Grouped(groups) => {
                let formatted: Vec<(String, String)> = groups
                    .iter()
                    .map(|(k, v)| (k.clone(), format_value(*v, kind)))
                    .collect();
                let joined = formatted
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                (joined, formatted, ThresholdLevel::Normal)
            }
        };
        MetricResult {
            metric_id: self.definition.id.clone(),
            raw_value,
            formatted_value,
            formatted_groups,
            threshold_level,
        }
    }

    fn empty_result(&self) -> MetricResult {
        if self.definition.group_by.is_some() {
            return self.result(MetricValue::Grouped(Vec::new()));
        }
        MetricResult {
            metric_id: self.definition.id.clone(),
            raw_value: MetricValue::Number(0.0),
            formatted_value: zero_for(self.definition.visualization.kind),
            formatted_groups: Vec::new(),
            threshold_level: ThresholdLevel::Normal,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MetricRegistry {
    metrics: BTreeMap<String, RegisteredMetric>,
}

impl MetricRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `definition`. Registering an identical definition twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::AlreadyRegistered`] if a different definition
    /// uses the same id, or [`MetricError::InvalidFormula`] if a textual
    /// formula does not parse.
    pub fn register(&mut self, definition: MetricDefinition) -> Result<(), MetricError> {
        if let Some(existing) = self.metrics.get(&definition.id) {
            if existing.definition == definition {
                return Ok(());
            }
            return Err(MetricError::AlreadyRegistered(definition.id));
        }

        let compiled = match &definition.formula {
            Formula::Expression(text) => {
                let expr = expression::parse(text).map_err(|reason| MetricError::InvalidFormula {
                    metric_id: definition.id.clone(),
                    reason,
                })?;
                Compiled::Expression(expr)
            }
            Formula::Function(f) => Compiled::Function(f.clone()),
        };

        tracing::debug!(metric_id = %definition.id, "registered metric");
        self.metrics.insert(
            definition.id.clone(),
            RegisteredMetric {
                definition,
                compiled,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    #[must_use]
    pub fn freeze(self) -> MetricEngine {
        MetricEngine {
            metrics: self.metrics,
            cache: MetricCache::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct MetricEngine {
    metrics: BTreeMap<String, RegisteredMetric>,
    cache: MetricCache,
}

impl MetricEngine {
    fn lookup(&self, metric_id: &str) -> Result<&RegisteredMetric, MetricError> {
        self.metrics
            .get(metric_id)
            .ok_or_else(|| MetricError::UnknownMetric(metric_id.to_string()))
    }

    #[must_use]
    pub fn definition(&self, metric_id: &str) -> Option<&MetricDefinition> {
        self.metrics.get(metric_id).map(|m| &m.definition)
    }

    /// Registered metric ids in lexical order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    #[must_use]
    pub fn cache(&self) -> &MetricCache {
        &self.cache
    }

    /// Evaluate one metric over `rows`.
    ///
    /// An empty row set yields the zero of the metric's visualization
    /// without evaluating the formula.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::UnknownMetric`] for an unregistered id, or the
    /// error raised while evaluating the formula.
    pub fn calculate(
        &self,
        metric_id: &str,
        rows: &[ReportRow],
        context: &MetricContext,
    ) -> Result<MetricResult, MetricError> {
        let metric = self.lookup(metric_id)?;
        if rows.is_empty() {
            return Ok(metric.empty_result());
        }

        let cache_slot = metric.definition.caching.as_ref().and_then(|policy| {
            let fp = fingerprint(rows)?;
            Some((cache_key(metric_id, &policy.key_fields, context), fp, policy.ttl))
        });

        if let Some((key, fp, _)) = &cache_slot {
            if let Some(hit) = self.cache.get(key, fp, Instant::now()) {
                tracing::debug!(metric_id, cache_key = %key, "metric cache hit");
                return Ok(hit);
            }
            tracing::debug!(metric_id, cache_key = %key, "metric cache miss");
        }

        let result = metric.result(metric.evaluate(rows, context)?);

        if let Some((key, fp, ttl)) = cache_slot {
            self.cache.insert(key, fp, ttl, Instant::now(), result.clone());
        }
        Ok(result)
    }

    /// Evaluate several metrics over the same rows. Duplicate ids collapse
    /// into one entry.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`MetricEngine::calculate`].
    pub fn calculate_many<S: AsRef<str>>(
        &self,
        metric_ids: &[S],
        rows: &[ReportRow],
        context: &MetricContext,
    ) -> Result<BTreeMap<String, MetricResult>, MetricError> {
        let mut results = BTreeMap::new();
        for id in metric_ids {
            let id = id.as_ref();
            if results.contains_key(id) {
                continue;
            }
            results.insert(id.to_string(), self.calculate(id, rows, context)?);
        }
        Ok(results)
    }

    /// Classify `raw_value` against the metric's thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::UnknownMetric`] for an unregistered id.
    pub fn evaluate_threshold(
        &self,
        metric_id: &str,
        raw_value: f64,
    ) -> Result<ThresholdLevel, MetricError> {
        let metric = self.lookup(metric_id)?;
        Ok(classify(raw_value, metric.definition.thresholds.as_ref()))
    }
}

impl std::fmt::Debug for MetricEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricEngine")
            .field("metrics", &self.metrics.keys().collect::<Vec<_>>())
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
