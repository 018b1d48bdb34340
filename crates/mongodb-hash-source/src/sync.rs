//! Hash-diff pipeline runs.

use analytics_sink::{finish_transaction, Target, TargetTransaction, UpsertBatch};
use anyhow::{Context, Result};
use checkpoint::{read_watermark, CheckpointRecord};
use chrono::{DateTime, Utc};
use std::time::Instant;
use sync_core::{DocumentSyncConfig, Record, SyncError, SyncReport};
use tracing::{debug, info};

use crate::diff::{diff, target_record};
use crate::source::DocumentSource;

/// Options for one run
#[derive(Clone, Debug, Default)]
pub struct SyncOpts {
    /// Classify and write inside the transaction, then roll it back
    pub dry_run: bool,
}

/// Replicate the new and changed documents of one collection.
///
/// The whole collection is read before any transaction is opened. Stored
/// fingerprints, the upsert and the checkpoint then share one transaction:
/// either all of it commits or nothing does.
pub async fn run_hash_diff_sync<T, S>(
    target: &T,
    source: &S,
    config: &DocumentSyncConfig,
    opts: &SyncOpts,
) -> Result<SyncReport>
where
    T: Target,
    S: DocumentSource + ?Sized,
{
    let started = Instant::now();
    let namespace = format!("{}.{}", config.database, config.collection);
    info!("Starting MongoDB hash-diff sync of {namespace}");
    config.validate()?;

    let documents = source
        .fetch_all()
        .await
        .map_err(|e| SyncError::source_unavailable(&namespace, format!("{e:#}")))?;
    info!("Fetched {} documents from {namespace}", documents.len());

    let mut report = if documents.is_empty() {
        info!("No documents found in {namespace}");
        SyncReport::new(&config.checkpoint_name)
    } else {
        let mut tx = target
            .begin()
            .await
            .with_context(|| format!("Failed to open transaction for {namespace}"))?;
        let outcome = apply_documents(&mut tx, &documents, config, Utc::now()).await;
        finish_transaction(tx, outcome, opts.dry_run)
            .await
            .with_context(|| format!("Hash-diff sync of {namespace} failed"))?
    };

    report.dry_run = opts.dry_run;
    report.elapsed = started.elapsed();
    info!("{report}");
    Ok(report)
}

async fn apply_documents<Tx>(
    tx: &mut Tx,
    documents: &[Record],
    config: &DocumentSyncConfig,
    run_started: DateTime<Utc>,
) -> Result<SyncReport>
where
    Tx: TargetTransaction,
{
    let previous = read_watermark(tx, &config.checkpoint_name).await?;

    let stored = tx
        .load_fingerprints(
            &config.target_table,
            &config.target_identity_column,
            &config.fingerprint_column,
        )
        .await
        .map_err(|e| SyncError::fingerprint_load(&config.target_table, format!("{e:#}")))?;
    debug!(
        "Loaded {} stored fingerprints from {}",
        stored.len(),
        config.target_table
    );

    let changes = diff(documents, config, &stored, run_started);
    for reason in &changes.skipped {
        debug!("Skipping document: {reason}");
    }
    info!(
        "{} new, {} changed, {} unchanged, {} skipped",
        changes.inserted,
        changes.updated,
        changes.unchanged,
        changes.skipped.len()
    );

    let rows = changes
        .changes()
        .map(|change| target_record(change, config))
        .collect();
    let batch = UpsertBatch::from_records(
        &config.target_table,
        &config.target_identity_column,
        rows,
    )?
    .with_insert_only([config.first_seen_column.as_str()]);
    let upserted = tx
        .upsert_batch(&batch)
        .await
        .map_err(|e| SyncError::target_write(&config.target_table, format!("{e:#}")))?;
    if upserted > 0 {
        info!("Upserted {upserted} rows into {}", config.target_table);
    }

    let watermark = previous.advance(run_started);
    tx.write_checkpoint(&CheckpointRecord::success(
        &config.checkpoint_name,
        watermark,
        documents.len() as u64,
    ))
    .await
    .map_err(|e| SyncError::checkpoint_write(&config.checkpoint_name, format!("{e:#}")))?;

    let mut report = SyncReport::new(&config.checkpoint_name);
    report.records_read = documents.len();
    report.inserted = changes.inserted;
    report.updated = changes.updated;
    report.unchanged = changes.unchanged;
    report.skipped = changes.skipped.len();
    report.upserted = upserted;
    report.watermark = Some(watermark.instant());
    Ok(report)
}
