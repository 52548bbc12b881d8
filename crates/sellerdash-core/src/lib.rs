//! Shared data model for seller-report ingestion: report types, schema
//! descriptors, typed values and coercion, semantic rules, upload history
//! records, and application configuration.

pub mod app_config;
pub mod coerce;
pub mod config;
pub mod filter;
pub mod registry;
pub mod report_type;
pub mod row;
pub mod rules;
pub mod schema;
pub mod upload;
pub mod value;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use coerce::{coerce, CoercionError};
pub use config::{load_app_config, load_app_config_from_env};
pub use filter::ReportFilter;
pub use registry::{
    ReturnsPolicy, TypeRegistry, DEFAULT_RETURN_CARRIERS, DEFAULT_RETURN_CENTERS,
    DEFAULT_TRACKING_PREFIXES,
};
pub use report_type::ReportType;
pub use row::{NaturalKey, ReportRow, TypedRow};
pub use rules::{RuleCheck, SemanticRule};
pub use schema::{ColumnSpec, SchemaDescriptor, SemanticType, STORE_ID_COLUMN};
pub use upload::{NewUploadHistory, RejectionCounts, UploadHistory, UploadStatus};
pub use value::Value;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown report type: {0}")]
    UnknownReportType(String),
    #[error("unknown upload status: {0}")]
    UnknownUploadStatus(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
