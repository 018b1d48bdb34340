//! Watermark-based PostgreSQL replication for analytics-sync
//!
//! Each configured table carries an updated marker and a soft-delete marker
//! column. A run reads only the rows whose markers are later than the
//! table's checkpoint watermark and upserts them into the analytics table.
//! Soft deletes propagate as upserts carrying the deletion marker; target
//! rows are never deleted.

pub mod memory;
mod source;
mod sync;

pub use source::{
    change_marker, extraction_query, qualifies, PostgresWatermarkSource, WatermarkSource,
};
pub use sync::{sync_all_tables, sync_table, SyncOpts, TableOutcome};
