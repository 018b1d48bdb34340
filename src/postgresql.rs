//! PostgreSQL watermark run wiring.

use analytics_sync_postgresql::{new_postgresql_client, new_shared_client, PostgresTarget};
use analytics_sync_postgresql_watermark_source::{
    sync_all_tables, PostgresWatermarkSource, SyncOpts, TableOutcome,
};
use anyhow::{Context, Result};

use crate::{AppConfig, PostgresOpts};

/// Run the watermark pipeline for `tables` (all configured tables if empty).
///
/// The source gets its own connection; the target connection is held by the
/// open transaction while rows are read.
pub async fn run_postgresql(
    pg: &PostgresOpts,
    config: &AppConfig,
    tables: &[String],
    dry_run: bool,
) -> Result<Vec<TableOutcome>> {
    let selected = config.select_tables(tables)?;
    let pg_config = pg.to_config()?;

    let target = PostgresTarget::with_checkpoint_table(
        new_shared_client(&pg_config).await?,
        &config.checkpoint_table,
    );
    let source = PostgresWatermarkSource::new(
        new_postgresql_client(&pg_config)
            .await
            .context("Failed to open source connection")?,
    );

    Ok(sync_all_tables(&target, &source, &selected, &SyncOpts { dry_run }).await)
}
