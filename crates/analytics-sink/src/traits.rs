//! Target and transaction traits.
//!
//! Pipelines are generic over [`Target`], so the same orchestration code runs
//! against PostgreSQL in production and against the in-memory target in tests:
//!
//! ```ignore
//! pub async fn sync_table<T: Target, S: WatermarkSource>(
//!     target: &T,
//!     source: &S,
//!     table: &TableSyncConfig,
//! ) -> Result<SyncReport> {
//!     let mut tx = target.begin().await?;
//!     let outcome = apply(&mut tx, source, table).await;
//!     finish_transaction(tx, outcome, dry_run).await
//! }
//! ```

use anyhow::Result;
use checkpoint::CheckpointStore;
use std::collections::HashMap;
use sync_core::Fingerprint;

use crate::UpsertBatch;

/// Writes batches into analytical tables.
#[async_trait::async_trait]
pub trait AnalyticsSink: Send {
    /// Insert-or-overwrite every record of `batch` keyed by its primary key.
    ///
    /// New keys are inserted; existing keys get every non-key column
    /// overwritten, except columns marked insert-only. An empty batch is a
    /// no-op returning 0. Returns the number of records written.
    async fn upsert_batch(&mut self, batch: &UpsertBatch) -> Result<u64>;

    /// Snapshot of `identity -> fingerprint` pairs currently stored in `table`.
    ///
    /// An empty table yields an empty map. Rows with a null identity or
    /// fingerprint are left out.
    async fn load_fingerprints(
        &mut self,
        table: &str,
        identity_column: &str,
        fingerprint_column: &str,
    ) -> Result<HashMap<String, Fingerprint>>;
}

/// One open transaction against the target: data writes and checkpoint
/// writes share it and become visible together.
#[async_trait::async_trait]
pub trait TargetTransaction: AnalyticsSink + CheckpointStore {
    /// Make every write of this transaction durable.
    async fn commit(self) -> Result<()>;

    /// Discard every write of this transaction.
    async fn rollback(self) -> Result<()>;
}

/// A target that can open transactions.
#[async_trait::async_trait]
pub trait Target: Send + Sync {
    type Transaction: TargetTransaction;

    /// Open a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}
