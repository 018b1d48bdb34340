//! Hash-diff MongoDB replication for analytics-sync
//!
//! The source collection has no reliable change marker, so every run reads
//! the whole collection, fingerprints each document and compares it with the
//! fingerprint stored next to the replicated row. Only new and changed
//! documents are written; unchanged ones are counted and left alone.

mod diff;
pub mod memory;
mod source;
mod sync;

pub use diff::{classify, diff, target_record};
pub use source::{
    convert_bson_to_universal_value, document_to_record, DocumentSource, MongoDocumentSource,
};
pub use sync::{run_hash_diff_sync, SyncOpts};
