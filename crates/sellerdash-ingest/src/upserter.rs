//! Writes one validated chunk inside one transaction.

use std::collections::BTreeSet;

use sellerdash_core::{ReportType, SchemaDescriptor};

use crate::error::{IngestError, StoreError};
use crate::store::{ReportStore, StoreAccess};
use crate::validator::ValidatedChunk;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: u64,
    pub updated: u64,
}

impl UpsertOutcome {
    #[must_use]
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Upsert every accepted row of `chunk` by natural key.
///
/// Store access is checked for each distinct `store_id` before the
/// transaction opens. Either every row of the chunk is committed or none is.
///
/// # Errors
///
/// Returns [`IngestError::UnauthorizedStore`] if the submitter may not write
/// to one of the chunk's stores, or [`IngestError::Transaction`] if any
/// lookup, write, or the commit fails.
pub async fn upsert_chunk(
    store: &dyn ReportStore,
    access: &dyn StoreAccess,
    descriptor: &SchemaDescriptor,
    chunk_index: usize,
    chunk: &ValidatedChunk,
    submitter_id: i64,
) -> Result<UpsertOutcome, IngestError> {
    if chunk.rows.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    let store_ids: BTreeSet<i64> = chunk.rows.iter().map(|row| row.store_id).collect();
    for store_id in store_ids {
        access
            .assert_submitter_has_store_access(submitter_id, store_id)
            .await?;
    }

    let report_type: ReportType = descriptor.report_type;
    let transaction = |source: StoreError| IngestError::Transaction {
        chunk: chunk_index,
        source,
    };

    let mut tx = store.begin().await.map_err(transaction)?;
    let mut outcome = UpsertOutcome::default();

    for row in &chunk.rows {
        match tx.upsert(report_type, row).await {
            Ok(written) if written.inserted => outcome.inserted += 1,
            Ok(_) => outcome.updated += 1,
            Err(e) => {
                tracing::warn!(
                    chunk = chunk_index,
                    row = row.row_index,
                    error = %e,
                    "upsert failed, rolling back chunk"
                );
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(chunk = chunk_index, error = %rollback, "rollback failed");
                }
                return Err(transaction(e));
            }
        }
    }

    tx.commit().await.map_err(transaction)?;
    tracing::debug!(
        chunk = chunk_index,
        inserted = outcome.inserted,
        updated = outcome.updated,
        "chunk committed"
    );
    Ok(outcome)
}
