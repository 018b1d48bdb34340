//! Core types for the analytics-sync framework.
//!
//! This crate provides the foundational types shared by both replication
//! pipelines:
//!
//! - [`UniversalValue`] - Source-agnostic value representation
//! - [`Record`] - Ordered field/column map read from a source
//! - [`Fingerprint`] - Content digest used by the hash-diff pipeline
//! - [`ChangeSet`] / [`Classification`] - Per-run change decisions
//! - [`DocumentSyncConfig`] / [`TableSyncConfig`] - Per-source schema
//! - [`SyncError`] - Failure taxonomy of a run
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── checkpoint                           (watermark bookkeeping)
//!    ├─── analytics-sink                       (upsert writer contract)
//!    ├─── analytics-sync-postgresql            (PostgreSQL target + row conversion)
//!    ├─── analytics-sync-mongodb-hash-source   (hash-diff pipeline)
//!    └─── analytics-sync-postgresql-watermark-source (watermark pipeline)
//! ```

pub mod change;
pub mod error;
pub mod fingerprint;
pub mod record;
pub mod schema;
pub mod values;

pub use change::{identify, ChangeRecord, ChangeSet, Classification, SkipReason, SyncReport};
pub use error::SyncError;
pub use fingerprint::Fingerprint;
pub use record::Record;
pub use schema::{
    ensure_unique_checkpoints, DocumentSyncConfig, FieldMapping, SchemaError, TableSyncConfig,
};
pub use values::UniversalValue;
