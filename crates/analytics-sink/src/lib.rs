//! Analytics target abstraction.
//!
//! This crate defines the contract between the replication pipelines and the
//! analytical store they write to:
//!
//! - [`UpsertBatch`] - a uniform batch of records keyed by one primary key
//! - [`AnalyticsSink`] - idempotent insert-or-overwrite writes and fingerprint snapshots
//! - [`TargetTransaction`] / [`Target`] - one transaction shared by data and checkpoint writes
//! - [`finish_transaction`] - commit on success, roll back on failure or dry run
//!
//! The PostgreSQL implementation lives in `analytics-sync-postgresql`;
//! [`memory::MemoryTarget`] is a transactional in-memory target for tests.

mod batch;
pub mod memory;
mod traits;
mod transaction;

pub use batch::UpsertBatch;
pub use traits::{AnalyticsSink, Target, TargetTransaction};
pub use transaction::finish_transaction;
