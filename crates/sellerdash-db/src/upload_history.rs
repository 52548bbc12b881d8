//! Database operations for the append-only `upload_history` table.

use chrono::{DateTime, Utc};
use sellerdash_core::{
    NewUploadHistory, RejectionCounts, ReportType, UploadHistory, UploadStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{from_db_count, to_db_count, DbError};

const HISTORY_COLUMNS: &str = "id, public_id, submitter_id, report_type, filename, final_status, \
     message, rows_processed, total_rows, inserted_count, updated_count, accepted_count, \
     rejected_coercion_count, rejected_rules_count, rejected_duplicate_count, content_hash, \
     started_at, completed_at, created_at";

/// Largest page returned by [`list_upload_history`].
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// A row from the `upload_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UploadHistoryRow {
    pub id: i64,
    pub public_id: Uuid,
    pub submitter_id: i64,
    pub report_type: String,
    pub filename: String,
    pub final_status: String,
    pub message: String,
    pub rows_processed: i64,
    pub total_rows: Option<i64>,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub accepted_count: i64,
    pub rejected_coercion_count: i64,
    pub rejected_rules_count: i64,
    pub rejected_duplicate_count: i64,
    pub content_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UploadHistoryRow {
    /// Convert the stored text columns back into their domain enums.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Core`] if `report_type` or `final_status` hold an
    /// unrecognised value.
    pub fn into_domain(self) -> Result<UploadHistory, DbError> {
        Ok(UploadHistory {
            id: self.id,
            public_id: self.public_id,
            submitter_id: self.submitter_id,
            report_type: self.report_type.parse::<ReportType>()?,
            filename: self.filename,
            final_status: self.final_status.parse::<UploadStatus>()?,
            message: self.message,
            rows_processed: from_db_count(self.rows_processed),
            total_rows: self.total_rows.map(from_db_count),
            inserted_count: from_db_count(self.inserted_count),
            updated_count: from_db_count(self.updated_count),
            counts: RejectionCounts {
                accepted: from_db_count(self.accepted_count),
                rejected_for_coercion: from_db_count(self.rejected_coercion_count),
                rejected_for_rules: from_db_count(self.rejected_rules_count),
                rejected_for_duplicate: from_db_count(self.rejected_duplicate_count),
            },
            content_hash: self.content_hash,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// Appends a history record. Generates the `public_id` in Rust.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_upload_history(
    pool: &PgPool,
    record: &NewUploadHistory,
) -> Result<UploadHistoryRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, UploadHistoryRow>(&format!(
        "INSERT INTO upload_history \
             (public_id, submitter_id, report_type, filename, final_status, message, \
              rows_processed, total_rows, inserted_count, updated_count, accepted_count, \
              rejected_coercion_count, rejected_rules_count, rejected_duplicate_count, \
              content_hash, started_at, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING {HISTORY_COLUMNS}"
    ))
    .bind(public_id)
    .bind(record.submitter_id)
    .bind(record.report_type.as_str())
    .bind(&record.filename)
    .bind(record.final_status.as_str())
    .bind(&record.message)
    .bind(to_db_count(record.rows_processed))
    .bind(record.total_rows.map(to_db_count))
    .bind(to_db_count(record.inserted_count))
    .bind(to_db_count(record.updated_count))
    .bind(to_db_count(record.counts.accepted))
    .bind(to_db_count(record.counts.rejected_for_coercion))
    .bind(to_db_count(record.counts.rejected_for_rules))
    .bind(to_db_count(record.counts.rejected_for_duplicate))
    .bind(&record.content_hash)
    .bind(record.started_at)
    .bind(record.completed_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns a submitter's most recent uploads, newest `started_at` first.
///
/// `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_upload_history(
    pool: &PgPool,
    submitter_id: i64,
    limit: i64,
) -> Result<Vec<UploadHistoryRow>, DbError> {
    let limit = limit.clamp(1, MAX_HISTORY_LIMIT);

    let rows = sqlx::query_as::<_, UploadHistoryRow>(&format!(
        "SELECT {HISTORY_COLUMNS} FROM upload_history \
         WHERE submitter_id = $1 \
         ORDER BY started_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(submitter_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Finds an earlier COMPLETED upload of the same content, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_completed_upload(
    pool: &PgPool,
    submitter_id: i64,
    report_type: ReportType,
    content_hash: &str,
) -> Result<Option<UploadHistoryRow>, DbError> {
    let row = sqlx::query_as::<_, UploadHistoryRow>(&format!(
        "SELECT {HISTORY_COLUMNS} FROM upload_history \
         WHERE submitter_id = $1 AND report_type = $2 AND content_hash = $3 \
           AND final_status = 'COMPLETED' \
         ORDER BY started_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(submitter_id)
    .bind(report_type.as_str())
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
