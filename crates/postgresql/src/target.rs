//! PostgreSQL implementation of the analytics target.

use analytics_sink::{AnalyticsSink, Target, TargetTransaction, UpsertBatch};
use anyhow::{Context, Result};
use checkpoint::{CheckpointRecord, CheckpointStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};
use tracing::{debug, warn};

use crate::sql::{fingerprint_query, rows_per_statement, upsert_statement, CheckpointSql};
use crate::value::{to_sql_param, SqlParam};
use sync_core::{Fingerprint, UniversalValue};

/// Default checkpoint table.
pub const DEFAULT_CHECKPOINT_TABLE: &str = "analytics.cdc_metadata";

/// Analytics target backed by one PostgreSQL connection.
///
/// Transactions hold the connection exclusively until they finish, so at
/// most one transaction per target is open at a time.
#[derive(Clone)]
pub struct PostgresTarget {
    client: Arc<Mutex<Client>>,
    checkpoint_sql: Arc<CheckpointSql>,
}

impl PostgresTarget {
    pub fn new(client: Arc<Mutex<Client>>) -> Self {
        Self::with_checkpoint_table(client, DEFAULT_CHECKPOINT_TABLE)
    }

    pub fn with_checkpoint_table(client: Arc<Mutex<Client>>, checkpoint_table: &str) -> Self {
        Self {
            client,
            checkpoint_sql: Arc::new(CheckpointSql::new(checkpoint_table)),
        }
    }
}

#[async_trait::async_trait]
impl Target for PostgresTarget {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let client = Arc::clone(&self.client).lock_owned().await;
        client
            .batch_execute("BEGIN")
            .await
            .context("Failed to begin transaction")?;
        debug!("Transaction started");
        Ok(PostgresTransaction {
            client: Some(client),
            checkpoint_sql: Arc::clone(&self.checkpoint_sql),
        })
    }
}

/// An open `BEGIN ... COMMIT` block.
///
/// Dropping it without calling `commit` or `rollback` issues a `ROLLBACK`
/// in the background before the connection can be used again.
pub struct PostgresTransaction {
    client: Option<OwnedMutexGuard<Client>>,
    checkpoint_sql: Arc<CheckpointSql>,
}

impl PostgresTransaction {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("transaction already finished"))
    }

    async fn finish(mut self, statement: &str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| anyhow::anyhow!("transaction already finished"))?;
        client.batch_execute(statement).await?;
        debug!("Transaction finished with {statement}");
        Ok(())
    }

    /// One `INSERT ... ON CONFLICT` statement for `rows` of `batch`.
    async fn execute_upsert(
        &self,
        batch: &UpsertBatch,
        rows: &[Vec<UniversalValue>],
    ) -> Result<u64> {
        let client = self.client()?;
        let sql = upsert_statement(batch, rows.len());
        let statement = client.prepare(&sql).await?;
        let types = statement.params();

        let mut params: Vec<SqlParam> = Vec::with_capacity(types.len());
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, value) in row.iter().enumerate() {
                let ty = &types[row_idx * row.len() + col_idx];
                let param = to_sql_param(value, ty).with_context(|| {
                    format!("column '{}' of row #{row_idx}", batch.columns()[col_idx])
                })?;
                params.push(param);
            }
        }

        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        client.execute(&statement, &param_refs).await?;
        Ok(rows.len() as u64)
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!("Rollback of abandoned transaction failed: {e}");
                    }
                });
            }
            Err(_) => warn!("Transaction dropped outside a runtime; it was not rolled back"),
        }
    }
}

#[async_trait::async_trait]
impl AnalyticsSink for PostgresTransaction {
    async fn upsert_batch(&mut self, batch: &UpsertBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let chunk_size = rows_per_statement(batch.columns().len());
        let mut written = 0;
        for chunk in batch.rows().chunks(chunk_size) {
            written += self.execute_upsert(batch, chunk).await?;
            debug!(
                "Upserted {} rows into {} ({written}/{})",
                chunk.len(),
                batch.table(),
                batch.len()
            );
        }
        Ok(written)
    }

    async fn load_fingerprints(
        &mut self,
        table: &str,
        identity_column: &str,
        fingerprint_column: &str,
    ) -> Result<HashMap<String, Fingerprint>> {
        let sql = fingerprint_query(table, identity_column, fingerprint_column);
        let rows = self.client()?.query(&sql, &[]).await?;

        let mut fingerprints = HashMap::with_capacity(rows.len());
        for row in &rows {
            let identity: Option<String> = row.try_get(0)?;
            let fingerprint: Option<String> = row.try_get(1)?;
            if let (Some(identity), Some(fingerprint)) = (identity, fingerprint) {
                fingerprints.insert(identity, Fingerprint::from_stored(fingerprint));
            }
        }
        debug!("Loaded {} fingerprints from {table}", fingerprints.len());
        Ok(fingerprints)
    }
}

fn checkpoint_from_row(row: &Row) -> Result<CheckpointRecord> {
    let status: Option<String> = row.try_get(2)?;
    Ok(CheckpointRecord {
        source_name: row.try_get(0)?,
        last_extracted: row.try_get::<_, Option<DateTime<Utc>>>(1)?,
        last_status: status.and_then(|s| s.parse().ok()),
        records_extracted: row.try_get::<_, Option<i64>>(3)?.unwrap_or(0),
        updated_at: row.try_get::<_, Option<DateTime<Utc>>>(4)?,
    })
}

#[async_trait::async_trait]
impl CheckpointStore for PostgresTransaction {
    async fn read_checkpoint(&mut self, source_name: &str) -> Result<Option<CheckpointRecord>> {
        let row = self
            .client()?
            .query_opt(&self.checkpoint_sql.select_one, &[&source_name])
            .await?;
        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn write_checkpoint(&mut self, record: &CheckpointRecord) -> Result<()> {
        let status = record.last_status.map(|s| s.as_str());
        self.client()?
            .execute(
                &self.checkpoint_sql.upsert,
                &[
                    &record.source_name,
                    &record.last_extracted,
                    &status,
                    &record.records_extracted,
                    &record.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn seed_checkpoint(&mut self, source_name: &str) -> Result<bool> {
        let created = self
            .client()?
            .execute(&self.checkpoint_sql.seed, &[&source_name])
            .await?;
        Ok(created > 0)
    }

    async fn list_checkpoints(&mut self) -> Result<Vec<CheckpointRecord>> {
        let rows = self
            .client()?
            .query(&self.checkpoint_sql.select_all, &[])
            .await?;
        rows.iter().map(checkpoint_from_row).collect()
    }
}

#[async_trait::async_trait]
impl TargetTransaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}
