use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("invalid formula for {metric_id}: {reason}")]
    InvalidFormula { metric_id: String, reason: String },

    #[error("column {column} holds a non-numeric value: {value:?}")]
    NonNumericValue { column: String, value: String },

    #[error("metric {metric_id} failed: {reason}")]
    Evaluation { metric_id: String, reason: String },
}
