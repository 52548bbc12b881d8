//! `upload` and `history` command handlers.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sellerdash_core::{AppConfig, ReportType, TypeRegistry};
use sellerdash_ingest::{
    IngestCoordinator, IngestSettings, PgReportStore, PgStoreAccess, UploadOutcome,
    UploadProgress,
};
use tokio::sync::watch;

fn coordinator(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    registry: Arc<TypeRegistry>,
) -> IngestCoordinator {
    let store = PgReportStore::new(pool.clone(), Arc::clone(&registry));
    let access = PgStoreAccess::new(pool.clone());
    IngestCoordinator::new(
        registry,
        Arc::new(store),
        Arc::new(access),
        IngestSettings::from_app_config(config),
    )
}

/// Ingest the CSV at `path` and print the outcome.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, the history record cannot
/// be written, or the job ends FAILED.
pub(crate) async fn run_upload(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    registry: Arc<TypeRegistry>,
    report_type: ReportType,
    submitter_id: i64,
    path: &Path,
) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (progress_tx, mut progress_rx) = watch::channel(UploadProgress::default());
    let reporter = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let p = progress_rx.borrow_and_update().clone();
            tracing::info!(
                status = %p.status,
                chunk = p.current_chunk,
                processed = p.processed_rows,
                total = ?p.total_rows,
                percent = p.progress_percent,
                "upload progress"
            );
        }
    });

    let outcome = coordinator(pool, config, registry)
        .submit_upload(file, &filename, report_type, submitter_id, Some(&progress_tx))
        .await?;
    drop(progress_tx);
    reporter.await.ok();

    print_outcome(&outcome);
    if !outcome.is_completed() {
        anyhow::bail!(
            "upload {} failed: {}",
            outcome.history.public_id,
            outcome.fatal_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_outcome(outcome: &UploadOutcome) {
    println!("upload:    {}", outcome.history.public_id);
    println!("file:      {}", outcome.history.filename);
    println!("status:    {}", outcome.status);
    match outcome.total_rows {
        Some(total) => println!("rows:      {} of {total}", outcome.processed_rows),
        None => println!("rows:      {}", outcome.processed_rows),
    }
    println!(
        "written:   {} inserted, {} updated",
        outcome.inserted, outcome.updated
    );
    println!("counts:    {}", outcome.counts);
    for warning in &outcome.warnings {
        println!("warning:   {warning}");
    }
    for error in &outcome.errors {
        println!("row error: {error}");
    }
    if outcome.error_count > outcome.errors.len() {
        println!(
            "           (and {} more row errors)",
            outcome.error_count - outcome.errors.len()
        );
    }
}

/// Print a submitter's upload history, newest first.
///
/// # Errors
///
/// Returns an error if the history query fails.
pub(crate) async fn run_history(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    registry: Arc<TypeRegistry>,
    submitter_id: i64,
    limit: usize,
) -> anyhow::Result<()> {
    let history = coordinator(pool, config, registry)
        .get_upload_history(submitter_id, limit)
        .await?;

    if history.is_empty() {
        println!("no uploads found for submitter {submitter_id}");
        return Ok(());
    }

    println!(
        "{:<22}{:<13}{:<11}{:>8}  FILE",
        "STARTED", "TYPE", "STATUS", "ROWS"
    );
    for entry in &history {
        println!(
            "{:<22}{:<13}{:<11}{:>8}  {}",
            entry.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.report_type.as_str(),
            entry.final_status.as_str(),
            entry.rows_processed,
            entry.filename
        );
    }
    Ok(())
}
