//! Failure taxonomy of a synchronization run.

use thiserror::Error;

/// Classified run failures.
///
/// Every variant aborts the run; the transaction is rolled back and the
/// checkpoint stays where it was. Malformed source records are not errors,
/// see [`crate::SkipReason`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source could not be reached or queried.
    #[error("source '{source_name}' is unavailable: {cause}")]
    SourceUnavailable { source_name: String, cause: String },

    /// The fingerprint snapshot of the target could not be loaded.
    #[error("failed to load fingerprints from '{table}': {cause}")]
    FingerprintLoad { table: String, cause: String },

    /// The upsert statement failed.
    #[error("failed to write batch to '{table}': {cause}")]
    TargetWriteFailure { table: String, cause: String },

    /// The checkpoint row could not be written.
    #[error("failed to write checkpoint '{source_name}': {cause}")]
    CheckpointWriteFailure { source_name: String, cause: String },

    /// A batch mixed records with different column sets.
    #[error("record #{position} in batch for '{table}' has columns [{found}], expected [{expected}]")]
    NonUniformBatch {
        table: String,
        position: usize,
        expected: String,
        found: String,
    },

    /// A record in a batch has no usable primary key value.
    #[error("record #{position} in batch for '{table}' has no value for primary key '{primary_key}'")]
    MissingPrimaryKey {
        table: String,
        position: usize,
        primary_key: String,
    },
}

impl SyncError {
    pub fn source_unavailable(source_name: impl Into<String>, cause: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            cause: cause.to_string(),
        }
    }

    pub fn target_write(table: impl Into<String>, cause: impl ToString) -> Self {
        Self::TargetWriteFailure {
            table: table.into(),
            cause: cause.to_string(),
        }
    }

    pub fn checkpoint_write(source_name: impl Into<String>, cause: impl ToString) -> Self {
        Self::CheckpointWriteFailure {
            source_name: source_name.into(),
            cause: cause.to_string(),
        }
    }

    pub fn fingerprint_load(table: impl Into<String>, cause: impl ToString) -> Self {
        Self::FingerprintLoad {
            table: table.into(),
            cause: cause.to_string(),
        }
    }
}
