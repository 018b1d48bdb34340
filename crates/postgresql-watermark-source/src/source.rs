//! Watermark-filtered reads.

use analytics_sync_postgresql::{row_to_record, sql::quote_ident};
use anyhow::{Context, Result};
use async_trait::async_trait;
use checkpoint::Watermark;
use chrono::{DateTime, Utc};
use sync_core::{Record, TableSyncConfig};
use tokio_postgres::Client;
use tracing::debug;

/// Reads the rows of a table changed after a watermark.
#[async_trait]
pub trait WatermarkSource: Send + Sync {
    /// Rows whose updated marker or deleted marker is later than `since`,
    /// ordered by [`change_marker`] ascending.
    async fn fetch_changes(&self, table: &TableSyncConfig, since: Watermark) -> Result<Vec<Record>>;
}

fn marker(record: &Record, column: &str) -> Option<DateTime<Utc>> {
    record.get(column).and_then(|v| v.as_utc())
}

/// `COALESCE(updated, deleted)` of a row.
pub fn change_marker(record: &Record, table: &TableSyncConfig) -> Option<DateTime<Utc>> {
    marker(record, &table.updated_column).or_else(|| marker(record, &table.deleted_column))
}

/// Whether a row changed after `since`.
///
/// A row qualifies if its updated marker is set and later than `since`, or
/// its deleted marker is set and later than `since`. A row with neither
/// marker never qualifies.
pub fn qualifies(record: &Record, table: &TableSyncConfig, since: Watermark) -> bool {
    let since = since.instant();
    let later = |column: &str| marker(record, column).is_some_and(|t| t > since);
    later(&table.updated_column) || later(&table.deleted_column)
}

/// The extraction query for `table`; `$1` is the watermark.
///
/// Ties on the change marker are broken by primary key so repeated runs read
/// rows in the same order.
pub fn extraction_query(table: &TableSyncConfig) -> String {
    let updated = quote_ident(&table.updated_column);
    let deleted = quote_ident(&table.deleted_column);
    format!(
        "SELECT * FROM {} \
         WHERE ({updated} IS NOT NULL AND {updated} > $1::timestamptz) \
         OR ({deleted} IS NOT NULL AND {deleted} > $1::timestamptz) \
         ORDER BY COALESCE({updated}, {deleted}), {}",
        quote_ident(&table.source_table),
        quote_ident(&table.primary_key)
    )
}

/// [`WatermarkSource`] reading from a live PostgreSQL connection.
///
/// Uses its own connection: the target connection is held by the run's
/// transaction while the source is read.
pub struct PostgresWatermarkSource {
    client: Client,
}

impl PostgresWatermarkSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WatermarkSource for PostgresWatermarkSource {
    async fn fetch_changes(&self, table: &TableSyncConfig, since: Watermark) -> Result<Vec<Record>> {
        let query = extraction_query(table);
        debug!("Extracting {} with: {query}", table.source_table);

        let rows = self
            .client
            .query(&query, &[&since.instant()])
            .await
            .with_context(|| format!("Failed to query {}", table.source_table))?;

        rows.iter()
            .map(|row| row_to_record(row).map_err(anyhow::Error::from))
            .collect()
    }
}
