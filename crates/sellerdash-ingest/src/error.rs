use sellerdash_core::{CoreError, ReportType};
use sellerdash_db::DbError;
use thiserror::Error;
use uuid::Uuid;

/// Failures while decoding or parsing the CSV stream.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file contains no data rows")]
    EmptyFile,
    #[error(
        "header does not match the {report_type} template: missing [{}], expected [{}], found [{}]",
        missing.join(", "),
        expected.join(", "),
        found.join(", ")
    )]
    HeaderMismatch {
        report_type: ReportType,
        missing: Vec<String>,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("cannot decode file as {encoding}: {reason}")]
    Encoding {
        encoding: &'static str,
        reason: String,
    },
    #[error("malformed CSV: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`ReportStore`](crate::store::ReportStore) adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("row already exists: {0}")]
    Conflict(String),
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Failures of the store-access collaborator.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("submitter {submitter_id} has no access to store {store_id}")]
    Unauthorized { submitter_id: i64, store_id: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fatal upload errors. Any of these moves the job to FAILED.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file contains no data rows")]
    EmptyFile,
    #[error(
        "header does not match the {report_type} template: missing [{}], expected [{}], found [{}]",
        missing.join(", "),
        expected.join(", "),
        found.join(", ")
    )]
    HeaderMismatch {
        report_type: ReportType,
        missing: Vec<String>,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("cannot decode file as {encoding}: {reason}")]
    Encoding {
        encoding: &'static str,
        reason: String,
    },
    #[error("malformed CSV: {0}")]
    MalformedCsv(String),
    #[error("file is {size} bytes, larger than the {limit}-byte limit")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("only .csv files are accepted: {0}")]
    NotCsv(String),
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),
    #[error("identical content was already uploaded (upload {previous})")]
    DuplicateUpload { previous: Uuid },
    #[error("submitter {submitter_id} has no access to store {store_id}")]
    UnauthorizedStore { submitter_id: i64, store_id: i64 },
    #[error("transaction for chunk {chunk} failed: {source}")]
    Transaction {
        chunk: usize,
        #[source]
        source: StoreError,
    },
    #[error("unknown report type: {0}")]
    UnknownReportType(String),
    #[error("upload cannot move from {from} to {to}")]
    InvalidTransition {
        from: sellerdash_core::UploadStatus,
        to: sellerdash_core::UploadStatus,
    },
    #[error("background file task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ReadError> for IngestError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::EmptyFile => IngestError::EmptyFile,
            ReadError::HeaderMismatch {
                report_type,
                missing,
                expected,
                found,
            } => IngestError::HeaderMismatch {
                report_type,
                missing,
                expected,
                found,
            },
            ReadError::Encoding { encoding, reason } => IngestError::Encoding { encoding, reason },
            ReadError::Malformed(message) => IngestError::MalformedCsv(message),
            ReadError::Io(e) => IngestError::Io(e),
        }
    }
}

impl From<CoreError> for IngestError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownReportType(name) => IngestError::UnknownReportType(name),
            other => IngestError::Store(StoreError::Core(other)),
        }
    }
}

impl From<AccessError> for IngestError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthorized {
                submitter_id,
                store_id,
            } => IngestError::UnauthorizedStore {
                submitter_id,
                store_id,
            },
            AccessError::Store(e) => IngestError::Store(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    InvalidValue,
    RuleViolation,
    DuplicateKey,
}

impl std::fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RowErrorKind::InvalidValue => "invalid value",
            RowErrorKind::RuleViolation => "rule violation",
            RowErrorKind::DuplicateKey => "duplicate key",
        })
    }
}

/// A partial error: the row is skipped, the upload continues.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RowError {
    /// 1-based data-row index within the file.
    pub row_index: usize,
    pub column: Option<String>,
    pub kind: RowErrorKind,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(column) => write!(
                f,
                "row {} [{column}]: {}: {}",
                self.row_index, self.kind, self.message
            ),
            None => write!(f, "row {}: {}: {}", self.row_index, self.kind, self.message),
        }
    }
}
