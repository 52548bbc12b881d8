//! Postgres adapters backed by `sellerdash-db`.

use std::sync::Arc;

use async_trait::async_trait;
use sellerdash_core::{
    NaturalKey, NewUploadHistory, ReportFilter, ReportRow, ReportType, TypeRegistry, TypedRow,
    UploadHistory,
};
use sellerdash_db::{self as db, DbError};
use sqlx::{PgPool, Postgres, Transaction};

use super::{clamp_history_limit, ReportStore, ReportTx, StoreAccess, UpsertedRow};
use crate::error::{AccessError, StoreError};

#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
    registry: Arc<TypeRegistry>,
}

impl PgReportStore {
    #[must_use]
    pub fn new(pool: PgPool, registry: Arc<TypeRegistry>) -> Self {
        Self { pool, registry }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_db_error(err: DbError) -> StoreError {
    match err {
        DbError::NotFound => StoreError::NotFound,
        DbError::Sqlx(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            StoreError::Conflict(e.message().to_string())
        }
        other => StoreError::Db(other),
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn begin(&self) -> Result<Box<dyn ReportTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgReportTx {
            tx,
            registry: Arc::clone(&self.registry),
        }))
    }

    async fn query_rows(
        &self,
        report_type: ReportType,
        store_id: i64,
        filter: &ReportFilter,
    ) -> Result<Vec<ReportRow>, StoreError> {
        let descriptor = self.registry.descriptor_for(report_type)?;
        db::query_report_rows(&self.pool, descriptor, store_id, filter)
            .await
            .map_err(map_db_error)
    }

    async fn record_upload_history(
        &self,
        record: NewUploadHistory,
    ) -> Result<UploadHistory, StoreError> {
        let row = db::insert_upload_history(&self.pool, &record).await?;
        Ok(row.into_domain()?)
    }

    async fn list_upload_history(
        &self,
        submitter_id: i64,
        limit: usize,
    ) -> Result<Vec<UploadHistory>, StoreError> {
        let limit = i64::try_from(clamp_history_limit(limit)).unwrap_or(db::MAX_HISTORY_LIMIT);
        let rows = db::list_upload_history(&self.pool, submitter_id, limit).await?;
        rows.into_iter()
            .map(|row| row.into_domain().map_err(StoreError::from))
            .collect()
    }

    async fn find_completed_upload(
        &self,
        submitter_id: i64,
        report_type: ReportType,
        content_hash: &str,
    ) -> Result<Option<UploadHistory>, StoreError> {
        let row =
            db::find_completed_upload(&self.pool, submitter_id, report_type, content_hash).await?;
        Ok(row.map(db::UploadHistoryRow::into_domain).transpose()?)
    }
}

struct PgReportTx {
    tx: Transaction<'static, Postgres>,
    registry: Arc<TypeRegistry>,
}

#[async_trait]
impl ReportTx for PgReportTx {
    async fn find_by_key(
        &mut self,
        report_type: ReportType,
        key: &NaturalKey,
    ) -> Result<Option<ReportRow>, StoreError> {
        let descriptor = self.registry.descriptor_for(report_type)?;
        db::find_report_row_for_update(&mut self.tx, descriptor, key)
            .await
            .map_err(map_db_error)
    }

    async fn upsert(
        &mut self,
        report_type: ReportType,
        row: &TypedRow,
    ) -> Result<UpsertedRow, StoreError> {
        let descriptor = self.registry.descriptor_for(report_type)?;
        db::upsert_report_row(&mut self.tx, descriptor, row.store_id, &row.values)
            .await
            .map_err(map_db_error)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Authorizes a submitter against `stores.owner_id`.
#[derive(Clone)]
pub struct PgStoreAccess {
    pool: PgPool,
}

impl PgStoreAccess {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreAccess for PgStoreAccess {
    async fn assert_submitter_has_store_access(
        &self,
        submitter_id: i64,
        store_id: i64,
    ) -> Result<(), AccessError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        let allowed = db::submitter_has_store_access(&mut conn, submitter_id, store_id)
            .await
            .map_err(StoreError::from)?;
        if allowed {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                submitter_id,
                store_id,
            })
        }
    }
}
