//! Upload lifecycle status and the persisted audit record of an upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::report_type::ReportType;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Initializing,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Initializing => "INITIALIZING",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (UploadStatus::Initializing, UploadStatus::Processing | UploadStatus::Failed)
                | (UploadStatus::Processing, UploadStatus::Completed | UploadStatus::Failed)
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INITIALIZING" => Ok(UploadStatus::Initializing),
            "PROCESSING" => Ok(UploadStatus::Processing),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "FAILED" => Ok(UploadStatus::Failed),
            _ => Err(CoreError::UnknownUploadStatus(s.to_string())),
        }
    }
}

/// Per-upload row accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub accepted: u64,
    pub rejected_for_coercion: u64,
    pub rejected_for_rules: u64,
    pub rejected_for_duplicate: u64,
}

impl RejectionCounts {
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected_for_coercion + self.rejected_for_rules + self.rejected_for_duplicate
    }

    pub fn absorb(&mut self, other: &RejectionCounts) {
        self.accepted += other.accepted;
        self.rejected_for_coercion += other.rejected_for_coercion;
        self.rejected_for_rules += other.rejected_for_rules;
        self.rejected_for_duplicate += other.rejected_for_duplicate;
    }
}

impl std::fmt::Display for RejectionCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accepted={} rejected_for_coercion={} rejected_for_rules={} rejected_for_duplicate={}",
            self.accepted,
            self.rejected_for_coercion,
            self.rejected_for_rules,
            self.rejected_for_duplicate
        )
    }
}

/// Fields supplied when writing an upload history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUploadHistory {
    pub submitter_id: i64,
    pub report_type: ReportType,
    pub filename: String,
    pub final_status: UploadStatus,
    pub message: String,
    pub rows_processed: u64,
    pub total_rows: Option<u64>,
    pub inserted_count: u64,
    pub updated_count: u64,
    pub counts: RejectionCounts,
    pub content_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Immutable audit record of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadHistory {
    pub id: i64,
    pub public_id: Uuid,
    pub submitter_id: i64,
    pub report_type: ReportType,
    pub filename: String,
    pub final_status: UploadStatus,
    pub message: String,
    pub rows_processed: u64,
    pub total_rows: Option<u64>,
    pub inserted_count: u64,
    pub updated_count: u64,
    pub counts: RejectionCounts,
    pub content_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl UploadHistory {
    /// Materialise a stored record from its insert payload.
    #[must_use]
    pub fn from_new(id: i64, public_id: Uuid, new: NewUploadHistory) -> Self {
        Self {
            id,
            public_id,
            submitter_id: new.submitter_id,
            report_type: new.report_type,
            filename: new.filename,
            final_status: new.final_status,
            message: new.message,
            rows_processed: new.rows_processed,
            total_rows: new.total_rows,
            inserted_count: new.inserted_count,
            updated_count: new.updated_count,
            counts: new.counts,
            content_hash: new.content_hash,
            started_at: new.started_at,
            completed_at: new.completed_at,
        }
    }
}
