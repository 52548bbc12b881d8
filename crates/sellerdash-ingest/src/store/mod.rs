//! The narrow persistence interface the ingestion pipeline depends on.
//!
//! [`ReportStore`] and [`ReportTx`] abstract a transactional row store with
//! key-based lookup; [`StoreAccess`] is the host's authorization hook.
//! Postgres adapters live in [`postgres`], in-memory ones in [`memory`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sellerdash_core::{
    NaturalKey, NewUploadHistory, ReportFilter, ReportRow, ReportType, TypedRow, UploadHistory,
};

use crate::error::{AccessError, StoreError};

pub use sellerdash_db::UpsertedRow;

pub use memory::{MemoryReportStore, StaticStoreAccess};
pub use postgres::{PgReportStore, PgStoreAccess};

/// Largest page of upload history a store returns.
pub const MAX_HISTORY_LIMIT: usize = 200;

/// Clamp a requested history page size to `1..=MAX_HISTORY_LIMIT`.
#[must_use]
pub fn clamp_history_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Open a transaction. Dropping it without [`ReportTx::commit`] discards
    /// its changes.
    async fn begin(&self) -> Result<Box<dyn ReportTx>, StoreError>;

    async fn query_rows(
        &self,
        report_type: ReportType,
        store_id: i64,
        filter: &ReportFilter,
    ) -> Result<Vec<ReportRow>, StoreError>;

    async fn record_upload_history(
        &self,
        record: NewUploadHistory,
    ) -> Result<UploadHistory, StoreError>;

    /// Newest first by `started_at`; `limit` is clamped to `1..=200`.
    async fn list_upload_history(
        &self,
        submitter_id: i64,
        limit: usize,
    ) -> Result<Vec<UploadHistory>, StoreError>;

    async fn find_completed_upload(
        &self,
        submitter_id: i64,
        report_type: ReportType,
        content_hash: &str,
    ) -> Result<Option<UploadHistory>, StoreError>;
}

#[async_trait]
pub trait ReportTx: Send {
    /// Look up a row by key, locking it until the transaction ends.
    async fn find_by_key(
        &mut self,
        report_type: ReportType,
        key: &NaturalKey,
    ) -> Result<Option<ReportRow>, StoreError>;

    /// Insert `row`, or overwrite the non-key columns of the row already
    /// stored under its natural key and refresh `updated_at`.
    ///
    /// Two transactions writing the same new key serialize: the second
    /// waits for the first and then overwrites its row.
    async fn upsert(
        &mut self,
        report_type: ReportType,
        row: &TypedRow,
    ) -> Result<UpsertedRow, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreAccess: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AccessError::Unauthorized`] if the submitter may not write
    /// to `store_id`.
    async fn assert_submitter_has_store_access(
        &self,
        submitter_id: i64,
        store_id: i64,
    ) -> Result<(), AccessError>;
}
