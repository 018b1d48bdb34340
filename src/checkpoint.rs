//! Checkpoint table maintenance commands.

use analytics_sink::{finish_transaction, Target, TargetTransaction};
use anyhow::{Context, Result};
use checkpoint::{CheckpointRecord, CheckpointStore};

/// All checkpoint rows, ordered by source name.
pub async fn list_checkpoints<T: Target>(target: &T) -> Result<Vec<CheckpointRecord>> {
    let mut tx = target.begin().await?;
    let rows = tx.list_checkpoints().await;
    tx.rollback().await?;
    rows.context("Failed to read checkpoints")
}

/// Insert the missing checkpoint row of every name in `names`.
///
/// Existing rows are never touched. Returns the names that were seeded.
pub async fn seed_checkpoints<T: Target>(target: &T, names: &[&str]) -> Result<Vec<String>> {
    let mut tx = target.begin().await?;
    let outcome = seed_all(&mut tx, names).await;
    finish_transaction(tx, outcome, false)
        .await
        .context("Failed to seed checkpoints")
}

async fn seed_all<Tx: TargetTransaction>(tx: &mut Tx, names: &[&str]) -> Result<Vec<String>> {
    let mut seeded = Vec::new();
    for name in names {
        if tx.seed_checkpoint(name).await? {
            tracing::info!("Seeded checkpoint {name}");
            seeded.push(name.to_string());
        }
    }
    Ok(seeded)
}

/// Render checkpoint rows as an aligned text table.
pub fn format_checkpoints(rows: &[CheckpointRecord]) -> String {
    let header = ["source_name", "last_extracted", "status", "records", "updated_at"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            [
                row.source_name.clone(),
                row.last_extracted
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                row.last_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                row.records_extracted.to_string(),
                row.updated_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let render = |cells: &[&str]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(&header)];
    lines.extend(
        cells
            .iter()
            .map(|row| render(&row.each_ref().map(String::as_str))),
    );
    lines.join("\n")
}
