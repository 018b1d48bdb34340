//! Checkpoint storage trait.
//!
//! Implementations live next to the target they write to, because a
//! checkpoint must be written in the same transaction as the data it
//! describes: the PostgreSQL transaction in `analytics-sync-postgresql` and
//! the in-memory transaction in `analytics-sink::memory` both implement it.

use anyhow::Result;
use async_trait::async_trait;

use crate::{CheckpointRecord, Watermark};

/// Read/write access to the checkpoint table inside one transaction.
#[async_trait]
pub trait CheckpointStore: Send {
    /// Read the row for `source_name`. Returns `None` if it doesn't exist.
    async fn read_checkpoint(&mut self, source_name: &str) -> Result<Option<CheckpointRecord>>;

    /// Replace the row for `record.source_name`, creating it if missing.
    async fn write_checkpoint(&mut self, record: &CheckpointRecord) -> Result<()>;

    /// Create an empty row for `source_name` unless one exists.
    ///
    /// Returns true if a row was created.
    async fn seed_checkpoint(&mut self, source_name: &str) -> Result<bool>;

    /// Every row, ordered by source name.
    async fn list_checkpoints(&mut self) -> Result<Vec<CheckpointRecord>>;
}

/// Last committed watermark for `source_name`, or the epoch if there is none.
pub async fn read_watermark<S>(store: &mut S, source_name: &str) -> Result<Watermark>
where
    S: CheckpointStore + ?Sized,
{
    let watermark = match store.read_checkpoint(source_name).await? {
        Some(record) => record.watermark(),
        None => Watermark::epoch(),
    };

    if watermark.is_epoch() {
        tracing::info!("No previous extraction for {source_name}. Starting from epoch.");
    } else {
        tracing::info!("Last extraction for {source_name}: {watermark}");
    }
    Ok(watermark)
}
