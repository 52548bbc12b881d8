//! End-to-end upload orchestration.
//!
//! One [`IngestCoordinator::submit_upload`] call stages the source, streams
//! it chunk by chunk through validation and upsert, and always finishes by
//! writing an [`UploadHistory`] record, whether the job completed or failed.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use sellerdash_core::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_BYTES};
use sellerdash_core::{
    AppConfig, NewUploadHistory, RejectionCounts, ReportFilter, ReportRow, ReportType,
    TypeRegistry, UploadHistory, UploadStatus,
};
use tokio::sync::watch;

use crate::error::{IngestError, RowError};
use crate::progress::{UploadJob, UploadProgress};
use crate::reader::{count_rows_as, read_chunks_as};
use crate::staging::{sanitize_filename, stage};
use crate::store::{ReportStore, StoreAccess};
use crate::upserter::upsert_chunk;
use crate::validator::validate_chunk;

pub const DEFAULT_ERROR_DIGEST_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub max_upload_bytes: u64,
    pub count_rows: bool,
    pub reject_duplicate_uploads: bool,
    /// Row errors retained on the outcome and quoted in the history message.
    pub error_digest_limit: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            count_rows: true,
            reject_duplicate_uploads: false,
            error_digest_limit: DEFAULT_ERROR_DIGEST_LIMIT,
        }
    }
}

impl IngestSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            max_upload_bytes: config.max_upload_bytes,
            count_rows: config.count_rows,
            reject_duplicate_uploads: config.reject_duplicate_uploads,
            error_digest_limit: config.error_digest_limit,
        }
    }
}

/// The result of one upload, returned once it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    pub history: UploadHistory,
    /// Retained row errors, at most `error_digest_limit` of them.
    pub errors: Vec<RowError>,
    /// Every row error seen, retained or not.
    pub error_count: usize,
    pub warnings: Vec<String>,
    pub counts: RejectionCounts,
    pub inserted: u64,
    pub updated: u64,
    pub total_rows: Option<u64>,
    pub processed_rows: u64,
    /// Message of the error that failed the job.
    pub fatal_error: Option<String>,
}

impl UploadOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == UploadStatus::Completed
    }
}

/// Bookkeeping gathered while the job runs, copied into the history record.
#[derive(Debug, Default)]
struct RunTotals {
    stored_filename: Option<String>,
    content_hash: Option<String>,
    counts: RejectionCounts,
    inserted: u64,
    updated: u64,
}

pub struct IngestCoordinator {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn ReportStore>,
    access: Arc<dyn StoreAccess>,
    settings: IngestSettings,
    fixed_today: Option<NaiveDate>,
}

impl IngestCoordinator {
    #[must_use]
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn ReportStore>,
        access: Arc<dyn StoreAccess>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            registry,
            store,
            access,
            settings,
            fixed_today: None,
        }
    }

    /// Pin the date used by `date <= today` rules instead of the local clock.
    #[must_use]
    pub fn with_fixed_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Run one upload to completion.
    ///
    /// Fatal problems (bad file, header mismatch, encoding, authorization,
    /// chunk transaction failure) do not surface as `Err`: they end the job
    /// as FAILED and are reported on the returned outcome and its history
    /// record. Snapshots are published to `progress` after every state
    /// change. File I/O, hashing, CSV parsing and validation run on the
    /// blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] only if the history record itself
    /// cannot be written.
    pub async fn submit_upload<R: Read + Send + 'static>(
        &self,
        source: R,
        filename: &str,
        report_type: ReportType,
        submitter_id: i64,
        progress: Option<&watch::Sender<UploadProgress>>,
    ) -> Result<UploadOutcome, IngestError> {
        let started_at = Utc::now();
        let mut job = UploadJob::new(report_type, submitter_id, filename);
        let mut totals = RunTotals::default();
        publish(progress, &job);

        tracing::info!(
            report_type = %report_type,
            submitter_id,
            filename,
            "upload started"
        );

        let fatal = self
            .run(&mut job, &mut totals, source, started_at, progress)
            .await
            .err();

        let status = if fatal.is_some() {
            UploadStatus::Failed
        } else {
            UploadStatus::Completed
        };
        // Both INITIALIZING and PROCESSING may move to either terminal state.
        job.transition(status)?;
        publish(progress, &job);

        let fatal_error = fatal.map(|e| {
            tracing::warn!(
                report_type = %report_type,
                submitter_id,
                filename,
                error = %e,
                "upload failed"
            );
            e.to_string()
        });

        let record = NewUploadHistory {
            submitter_id,
            report_type,
            filename: totals
                .stored_filename
                .clone()
                .unwrap_or_else(|| job.source_filename.clone()),
            final_status: status,
            message: history_message(&job, &totals, fatal_error.as_deref()),
            rows_processed: job.processed_rows,
            total_rows: job.total_rows,
            inserted_count: totals.inserted,
            updated_count: totals.updated,
            counts: totals.counts,
            content_hash: totals.content_hash.clone(),
            started_at,
            completed_at: Utc::now(),
        };
        let history = self.store.record_upload_history(record).await?;

        tracing::info!(
            report_type = %report_type,
            submitter_id,
            filename,
            status = %status,
            rows_processed = job.processed_rows,
            inserted = totals.inserted,
            updated = totals.updated,
            rejected = totals.counts.rejected(),
            "upload finished"
        );

        Ok(UploadOutcome {
            status,
            history,
            errors: job.errors,
            error_count: job.error_count,
            warnings: job.warnings,
            counts: totals.counts,
            inserted: totals.inserted,
            updated: totals.updated,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            fatal_error,
        })
    }

    async fn run<R: Read + Send + 'static>(
        &self,
        job: &mut UploadJob,
        totals: &mut RunTotals,
        source: R,
        started_at: DateTime<Utc>,
        progress: Option<&watch::Sender<UploadProgress>>,
    ) -> Result<(), IngestError> {
        // INITIALIZING: the file must be acceptable before any row is read.
        let report_type = job.report_type;
        let descriptor = self.registry.descriptor_for(report_type)?;
        let name = sanitize_filename(&job.source_filename)?;
        totals.stored_filename = Some(name.stored_name(job.submitter_id, started_at));

        let max_bytes = self.settings.max_upload_bytes;
        let staged = blocking(move || stage(source, max_bytes)).await?;
        totals.content_hash = Some(staged.content_hash.clone());
        tracing::debug!(
            size = staged.size,
            content_hash = %staged.content_hash,
            encoding = staged.encoding.name(),
            "upload staged"
        );

        if self.settings.reject_duplicate_uploads {
            let previous = self
                .store
                .find_completed_upload(job.submitter_id, report_type, &staged.content_hash)
                .await?;
            if let Some(previous) = previous {
                return Err(IngestError::DuplicateUpload {
                    previous: previous.public_id,
                });
            }
        }

        job.transition(UploadStatus::Processing)?;
        publish(progress, job);

        let encoding = staged.encoding;
        if self.settings.count_rows {
            let file = staged.reader()?;
            job.total_rows = Some(blocking(move || Ok(count_rows_as(file, encoding)?)).await?);
            publish(progress, job);
        } else {
            job.warnings
                .push("row count skipped; progress percentage is unavailable".to_string());
        }

        let today = self.today();
        let chunk_size = self.settings.chunk_size;
        let file = staged.reader()?;
        let registry = Arc::clone(&self.registry);
        let mut chunks = blocking(move || {
            let descriptor = registry.descriptor_for(report_type)?;
            Ok(read_chunks_as(file, encoding, descriptor, chunk_size)?)
        })
        .await?;

        loop {
            // The reader travels to the blocking pool and back with each chunk.
            let registry = Arc::clone(&self.registry);
            let (reader, next) = blocking(move || {
                let Some(chunk) = chunks.next() else {
                    return Ok((chunks, None));
                };
                let chunk = chunk?;
                let descriptor = registry.descriptor_for(report_type)?;
                let validated = validate_chunk(&chunk, descriptor, today);
                Ok((chunks, Some((chunk.index, validated))))
            })
            .await?;
            chunks = reader;
            let Some((chunk_index, validated)) = next else {
                break;
            };

            let outcome = upsert_chunk(
                self.store.as_ref(),
                self.access.as_ref(),
                descriptor,
                chunk_index,
                &validated,
                job.submitter_id,
            )
            .await?;

            totals.counts.absorb(&validated.counts);
            totals.inserted += outcome.inserted;
            totals.updated += outcome.updated;
            job.processed_rows += validated.counts.accepted;
            job.current_chunk += 1;

            tracing::info!(
                chunk = chunk_index,
                accepted = validated.counts.accepted,
                inserted = outcome.inserted,
                updated = outcome.updated,
                rejected = validated.counts.rejected(),
                "chunk processed"
            );

            job.record_errors(validated.errors, self.settings.error_digest_limit);
            publish(progress, job);
        }

        if job.error_count > 0 {
            job.warnings.push(format!(
                "{} rows were skipped with {} row errors",
                totals.counts.rejected(),
                job.error_count
            ));
            publish(progress, job);
        }
        Ok(())
    }

    /// A submitter's uploads, newest first. `limit` is clamped to `1..=200`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] if the store query fails.
    pub async fn get_upload_history(
        &self,
        submitter_id: i64,
        limit: usize,
    ) -> Result<Vec<UploadHistory>, IngestError> {
        Ok(self.store.list_upload_history(submitter_id, limit).await?)
    }

    /// Persisted rows for metric evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] if the store query fails.
    pub async fn query_rows(
        &self,
        report_type: ReportType,
        store_id: i64,
        filter: &ReportFilter,
    ) -> Result<Vec<ReportRow>, IngestError> {
        Ok(self.store.query_rows(report_type, store_id, filter).await?)
    }
}

/// Run synchronous file work on the blocking thread pool.
async fn blocking<T, F>(work: F) -> Result<T, IngestError>
where
    F: FnOnce() -> Result<T, IngestError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

fn publish(progress: Option<&watch::Sender<UploadProgress>>, job: &UploadJob) {
    if let Some(sender) = progress {
        sender.send_replace(job.snapshot());
    }
}

fn history_message(job: &UploadJob, totals: &RunTotals, fatal: Option<&str>) -> String {
    let mut message = match fatal {
        Some(error) => error.to_string(),
        None => format!(
            "processed {} rows ({} inserted, {} updated); {}",
            job.processed_rows, totals.inserted, totals.updated, totals.counts
        ),
    };

    if !job.errors.is_empty() {
        message.push_str("\nrow errors:");
        for error in &job.errors {
            message.push_str("\n- ");
            message.push_str(&error.to_string());
        }
        let hidden = job.error_count.saturating_sub(job.errors.len());
        if hidden > 0 {
            message.push_str(&format!("\n(and {hidden} more)"));
        }
    }
    message
}
