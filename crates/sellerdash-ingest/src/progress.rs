//! Per-upload job state and the read-only snapshots published from it.

use sellerdash_core::{ReportType, UploadStatus};
use serde::Serialize;

use crate::error::{IngestError, RowError};

/// Read-only view of an upload in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadProgress {
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    pub current_chunk: usize,
    pub progress_percent: f64,
    pub status: UploadStatus,
    pub error_count: usize,
    pub warning_count: usize,
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self {
            total_rows: None,
            processed_rows: 0,
            current_chunk: 0,
            progress_percent: 0.0,
            status: UploadStatus::Initializing,
            error_count: 0,
            warning_count: 0,
        }
    }
}

/// `processed / total * 100`, rounded to two decimals; 0 when the total is
/// unknown or zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_percent(processed: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => {
            let percent = processed as f64 / total as f64 * 100.0;
            (percent * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}

/// The state of one upload. Private to the coordinator.
#[derive(Debug)]
pub(crate) struct UploadJob {
    pub(crate) report_type: ReportType,
    pub(crate) submitter_id: i64,
    pub(crate) source_filename: String,
    pub(crate) total_rows: Option<u64>,
    pub(crate) processed_rows: u64,
    pub(crate) current_chunk: usize,
    status: UploadStatus,
    pub(crate) errors: Vec<RowError>,
    /// Row errors seen, including ones not retained in `errors`.
    pub(crate) error_count: usize,
    pub(crate) warnings: Vec<String>,
}

impl UploadJob {
    pub(crate) fn new(report_type: ReportType, submitter_id: i64, source_filename: &str) -> Self {
        Self {
            report_type,
            submitter_id,
            source_filename: source_filename.to_string(),
            total_rows: None,
            processed_rows: 0,
            current_chunk: 0,
            status: UploadStatus::Initializing,
            errors: Vec::new(),
            error_count: 0,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn status(&self) -> UploadStatus {
        self.status
    }

    pub(crate) fn transition(&mut self, next: UploadStatus) -> Result<(), IngestError> {
        if !self.status.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Keep at most `retain` errors; the rest are only counted.
    pub(crate) fn record_errors(&mut self, errors: Vec<RowError>, retain: usize) {
        self.error_count += errors.len();
        let room = retain.saturating_sub(self.errors.len());
        self.errors.extend(errors.into_iter().take(room));
    }

    pub(crate) fn snapshot(&self) -> UploadProgress {
        UploadProgress {
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            current_chunk: self.current_chunk,
            progress_percent: progress_percent(self.processed_rows, self.total_rows),
            status: self.status,
            error_count: self.error_count,
            warning_count: self.warnings.len(),
        }
    }
}
