//! In-memory adapters for tests and embedding.
//!
//! A transaction holds the store lock from `begin` until it commits, rolls
//! back, or is dropped, so transactions are fully serialized. Changes are
//! staged in the transaction and applied only on commit.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sellerdash_core::{
    NaturalKey, NewUploadHistory, ReportFilter, ReportRow, ReportType, TypeRegistry, TypedRow,
    UploadHistory, UploadStatus, Value, STORE_ID_COLUMN,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{clamp_history_limit, ReportStore, ReportTx, StoreAccess, UpsertedRow};
use crate::error::{AccessError, StoreError};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<ReportRow>,
    index: HashMap<NaturalKey, usize>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<ReportType, Table>,
    history: Vec<UploadHistory>,
    commits: usize,
    /// Commit number (1-based, counted from store creation) that fails.
    fail_commit_at: Option<usize>,
}

#[derive(Clone)]
pub struct MemoryReportStore {
    state: Arc<Mutex<MemoryState>>,
    registry: Arc<TypeRegistry>,
}

impl MemoryReportStore {
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            registry,
        }
    }

    /// Make the next commit fail without applying its changes.
    pub async fn fail_next_commit(&self) {
        let mut state = self.state.lock().await;
        state.fail_commit_at = Some(state.commits + 1);
    }

    /// Make the `n`th commit from now (1-based) fail.
    pub async fn fail_commit_after(&self, n: usize) {
        let mut state = self.state.lock().await;
        state.fail_commit_at = Some(state.commits + n.max(1));
    }

    /// Every persisted row of `report_type`, in insertion order.
    pub async fn rows(&self, report_type: ReportType) -> Vec<ReportRow> {
        let state = self.state.lock().await;
        state
            .tables
            .get(&report_type)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn begin(&self) -> Result<Box<dyn ReportTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MemoryTx {
            guard,
            registry: Arc::clone(&self.registry),
            staged: Vec::new(),
            staged_index: HashMap::new(),
        }))
    }

    async fn query_rows(
        &self,
        report_type: ReportType,
        store_id: i64,
        filter: &ReportFilter,
    ) -> Result<Vec<ReportRow>, StoreError> {
        let descriptor = self.registry.descriptor_for(report_type)?;
        let state = self.state.lock().await;
        let Some(table) = state.tables.get(&report_type) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<ReportRow> = table
            .rows
            .iter()
            .filter(|row| row.store_id == store_id)
            .filter(|row| {
                filter.matches(
                    row.get(descriptor.date_column).and_then(Value::as_date),
                    row.get("sku").and_then(Value::as_str),
                    row.get("asin").and_then(Value::as_str),
                )
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.get(descriptor.date_column).and_then(Value::as_date));
        Ok(rows)
    }

    async fn record_upload_history(
        &self,
        record: NewUploadHistory,
    ) -> Result<UploadHistory, StoreError> {
        let mut state = self.state.lock().await;
        let id = i64::try_from(state.history.len()).unwrap_or(i64::MAX - 1) + 1;
        let history = UploadHistory::from_new(id, Uuid::new_v4(), record);
        state.history.push(history.clone());
        Ok(history)
    }

    async fn list_upload_history(
        &self,
        submitter_id: i64,
        limit: usize,
    ) -> Result<Vec<UploadHistory>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<UploadHistory> = state
            .history
            .iter()
            .filter(|h| h.submitter_id == submitter_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        rows.truncate(clamp_history_limit(limit));
        Ok(rows)
    }

    async fn find_completed_upload(
        &self,
        submitter_id: i64,
        report_type: ReportType,
        content_hash: &str,
    ) -> Result<Option<UploadHistory>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .rev()
            .find(|h| {
                h.submitter_id == submitter_id
                    && h.report_type == report_type
                    && h.final_status == UploadStatus::Completed
                    && h.content_hash.as_deref() == Some(content_hash)
            })
            .cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    registry: Arc<TypeRegistry>,
    staged: Vec<(ReportType, NaturalKey, ReportRow)>,
    staged_index: HashMap<(ReportType, NaturalKey), usize>,
}

impl MemoryTx {
    fn committed(&self, report_type: ReportType, key: &NaturalKey) -> Option<&ReportRow> {
        let table = self.guard.tables.get(&report_type)?;
        table.index.get(key).map(|&i| &table.rows[i])
    }

    fn current(&self, report_type: ReportType, key: &NaturalKey) -> Option<&ReportRow> {
        match self.staged_index.get(&(report_type, key.clone())) {
            Some(&i) => Some(&self.staged[i].2),
            None => self.committed(report_type, key),
        }
    }

    fn stage(&mut self, report_type: ReportType, key: NaturalKey, row: ReportRow) {
        let slot = (report_type, key.clone());
        if let Some(&i) = self.staged_index.get(&slot) {
            self.staged[i].2 = row;
        } else {
            self.staged_index.insert(slot, self.staged.len());
            self.staged.push((report_type, key, row));
        }
    }

    fn row_values(row: &TypedRow) -> std::collections::BTreeMap<String, Value> {
        let mut values = row.values.clone();
        values.insert(STORE_ID_COLUMN.to_string(), Value::Int(row.store_id));
        values
    }
}

#[async_trait]
impl ReportTx for MemoryTx {
    async fn find_by_key(
        &mut self,
        report_type: ReportType,
        key: &NaturalKey,
    ) -> Result<Option<ReportRow>, StoreError> {
        Ok(self.current(report_type, key).cloned())
    }

    async fn upsert(
        &mut self,
        report_type: ReportType,
        row: &TypedRow,
    ) -> Result<UpsertedRow, StoreError> {
        let descriptor = self.registry.descriptor_for(report_type)?;
        let key = row
            .natural_key(descriptor)
            .ok_or_else(|| StoreError::Conflict(format!("row {} has no key", row.row_index)))?;
        let now = Utc::now();

        let Some(existing) = self.current(report_type, &key).cloned() else {
            let stored = ReportRow {
                store_id: row.store_id,
                values: Self::row_values(row),
                created_at: now,
                updated_at: now,
            };
            self.stage(report_type, key, stored.clone());
            return Ok(UpsertedRow {
                row: stored,
                inserted: true,
            });
        };

        let mut values = existing.values.clone();
        for column in descriptor.non_key_columns() {
            let value = row.values.get(column.name).cloned().unwrap_or(Value::Null);
            values.insert(column.name.to_string(), value);
        }

        // Keep updated_at strictly increasing on coarse clocks.
        let updated_at = if now > existing.updated_at {
            now
        } else {
            existing.updated_at + Duration::microseconds(1)
        };

        let stored = ReportRow {
            store_id: existing.store_id,
            values,
            created_at: existing.created_at,
            updated_at,
        };
        self.stage(report_type, key, stored.clone());
        Ok(UpsertedRow {
            row: stored,
            inserted: false,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        guard.commits += 1;
        if guard.fail_commit_at == Some(guard.commits) {
            guard.fail_commit_at = None;
            return Err(StoreError::CommitFailed(format!(
                "injected failure on commit {}",
                guard.commits
            )));
        }

        for (report_type, key, row) in staged {
            let table = guard.tables.entry(report_type).or_default();
            if let Some(&i) = table.index.get(&key) {
                table.rows[i] = row;
            } else {
                table.index.insert(key, table.rows.len());
                table.rows.push(row);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Grants each submitter access to a fixed set of stores.
#[derive(Debug, Clone, Default)]
pub struct StaticStoreAccess {
    grants: HashMap<i64, BTreeSet<i64>>,
}

impl StaticStoreAccess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn grant(mut self, submitter_id: i64, store_id: i64) -> Self {
        self.grants.entry(submitter_id).or_default().insert(store_id);
        self
    }
}

#[async_trait]
impl StoreAccess for StaticStoreAccess {
    async fn assert_submitter_has_store_access(
        &self,
        submitter_id: i64,
        store_id: i64,
    ) -> Result<(), AccessError> {
        let allowed = self
            .grants
            .get(&submitter_id)
            .is_some_and(|stores| stores.contains(&store_id));
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sellerdash_core::RejectionCounts;
    use std::collections::BTreeMap;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::default())
    }

    fn typed_row(sku: &str, day: u32) -> TypedRow {
        let mut values = BTreeMap::new();
        values.insert("store_id".into(), Value::Int(1));
        values.insert(
            "date".into(),
            Value::Date(NaiveDate::from_ymd_opt(2025, 1, day).unwrap()),
        );
        values.insert("sku".into(), Value::from(sku));
        values.insert("asin".into(), Value::from("B000000001"));
        values.insert("sessions".into(), Value::Int(10));
        TypedRow {
            row_index: 1,
            store_id: 1,
            values,
        }
    }

    fn key_of(row: &TypedRow) -> NaturalKey {
        let registry = TypeRegistry::default();
        row.natural_key(registry.descriptor_for(ReportType::Business).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn uncommitted_changes_are_invisible_and_dropped() {
        let store = MemoryReportStore::new(registry());
        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert(ReportType::Business, &typed_row("SKU1", 1))
                .await
                .unwrap();
        }
        assert!(store.rows(ReportType::Business).await.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.upsert(ReportType::Business, &typed_row("SKU1", 1))
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert!(store.rows(ReportType::Business).await.is_empty());
    }

    #[tokio::test]
    async fn staged_rows_are_visible_inside_the_transaction() {
        let store = MemoryReportStore::new(registry());
        let row = typed_row("SKU1", 1);
        let mut tx = store.begin().await.unwrap();
        let first = tx.upsert(ReportType::Business, &row).await.unwrap();
        assert!(first.inserted);
        let found = tx
            .find_by_key(ReportType::Business, &key_of(&row))
            .await
            .unwrap();
        assert!(found.is_some());
        let second = tx.upsert(ReportType::Business, &row).await.unwrap();
        assert!(!second.inserted);
        tx.commit().await.unwrap();
        assert_eq!(store.rows(ReportType::Business).await.len(), 1);
    }

    #[tokio::test]
    async fn upsert_preserves_created_at_and_advances_updated_at() {
        let store = MemoryReportStore::new(registry());
        let row = typed_row("SKU1", 1);
        let mut tx = store.begin().await.unwrap();
        let inserted = tx.upsert(ReportType::Business, &row).await.unwrap();
        tx.commit().await.unwrap();

        let mut changed = row.clone();
        changed.values.insert("sessions".into(), Value::Int(99));
        let mut tx = store.begin().await.unwrap();
        let updated = tx.upsert(ReportType::Business, &changed).await.unwrap();
        tx.commit().await.unwrap();

        assert!(!updated.inserted);
        assert_eq!(updated.row.created_at, inserted.row.created_at);
        assert!(updated.row.updated_at > inserted.row.updated_at);
        let rows = store.rows(ReportType::Business).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("sessions"), Some(&Value::Int(99)));
    }

    #[tokio::test]
    async fn concurrent_writers_of_a_new_key_serialize() {
        let store = MemoryReportStore::new(registry());
        let row = typed_row("SKU1", 1);
        let mut first = store.begin().await.unwrap();
        first.upsert(ReportType::Business, &row).await.unwrap();

        let second = tokio::spawn({
            let store = store.clone();
            let mut changed = row.clone();
            changed.values.insert("sessions".into(), Value::Int(42));
            async move {
                let mut tx = store.begin().await.unwrap();
                let written = tx.upsert(ReportType::Business, &changed).await.unwrap();
                tx.commit().await.unwrap();
                written
            }
        });

        first.commit().await.unwrap();
        let written = second.await.unwrap();
        assert!(!written.inserted);
        let rows = store.rows(ReportType::Business).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("sessions"), Some(&Value::Int(42)));
    }

    #[tokio::test]
    async fn injected_commit_failure_applies_nothing() {
        let store = MemoryReportStore::new(registry());
        store.fail_next_commit().await;
        let mut tx = store.begin().await.unwrap();
        tx.upsert(ReportType::Business, &typed_row("SKU1", 1))
            .await
            .unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::CommitFailed(_))));
        assert!(store.rows(ReportType::Business).await.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.upsert(ReportType::Business, &typed_row("SKU1", 1))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.rows(ReportType::Business).await.len(), 1);
    }

    #[tokio::test]
    async fn query_filters_by_store_and_date() {
        let store = MemoryReportStore::new(registry());
        let mut tx = store.begin().await.unwrap();
        for (sku, day) in [("A", 3), ("B", 1), ("C", 2)] {
            tx.upsert(ReportType::Business, &typed_row(sku, day))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let rows = store
            .query_rows(ReportType::Business, 1, &ReportFilter::between(d(1), d(2)))
            .await
            .unwrap();
        let skus: Vec<&str> = rows
            .iter()
            .filter_map(|r| r.get("sku").and_then(Value::as_str))
            .collect();
        assert_eq!(skus, vec!["B", "C"]);

        let other_store = store
            .query_rows(ReportType::Business, 2, &ReportFilter::default())
            .await
            .unwrap();
        assert!(other_store.is_empty());
    }

    #[tokio::test]
    async fn history_is_listed_newest_first_and_clamped() {
        let store = MemoryReportStore::new(registry());
        let base = Utc::now();
        for minutes in 0..3 {
            let at = base + Duration::minutes(minutes);
            store
                .record_upload_history(NewUploadHistory {
                    submitter_id: 9,
                    report_type: ReportType::Business,
                    filename: format!("f{minutes}.csv"),
                    final_status: UploadStatus::Completed,
                    message: String::new(),
                    rows_processed: 0,
                    total_rows: None,
                    inserted_count: 0,
                    updated_count: 0,
                    counts: RejectionCounts::default(),
                    content_hash: Some(format!("h{minutes}")),
                    started_at: at,
                    completed_at: at,
                })
                .await
                .unwrap();
        }

        let page = store.list_upload_history(9, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].filename, "f2.csv");
        assert_eq!(store.list_upload_history(9, 50).await.unwrap().len(), 3);
        assert!(store.list_upload_history(8, 50).await.unwrap().is_empty());

        let found = store
            .find_completed_upload(9, ReportType::Business, "h1")
            .await
            .unwrap();
        assert_eq!(found.map(|h| h.filename), Some("f1.csv".to_string()));
    }

    #[tokio::test]
    async fn static_access_checks_grants() {
        let access = StaticStoreAccess::new().grant(9, 1);
        assert!(access.assert_submitter_has_store_access(9, 1).await.is_ok());
        assert!(matches!(
            access.assert_submitter_has_store_access(9, 2).await,
            Err(AccessError::Unauthorized {
                submitter_id: 9,
                store_id: 2
            })
        ));
    }
}
