//! Checkpoint management for analytics-sync
//!
//! A checkpoint is one row per logical source recording how far that source
//! has been replicated:
//!
//! - [`Watermark`] - the instant up to which a source is replicated; only moves forward
//! - [`CheckpointRecord`] - the persisted row (watermark, status, count, update time)
//! - [`CheckpointStore`] - transactional read/write access to the rows
//!
//! The store is the single source of truth for pipeline progress. Pipelines
//! never infer progress from the contents of their target tables.

mod record;
pub mod store;
mod watermark;


pub use record::{CheckpointRecord, CheckpointStatus};
pub use store::{read_watermark, CheckpointStore};
pub use watermark::Watermark;
