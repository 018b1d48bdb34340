//! Per-source schema definitions known at configuration time.
//!
//! ## Sources
//!
//! - [`DocumentSyncConfig`] - the document collection replicated by fingerprint
//!   comparison, with its identity field and the declared business fields
//! - [`TableSyncConfig`] - one relational table replicated by watermark
//!
//! Both are plain values deserialized from the application config file and
//! handed to the pipelines explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A required identifier is empty
    #[error("'{field}' must not be empty for source '{source_name}'")]
    EmptyIdentifier { source_name: String, field: String },

    /// Two sources share one checkpoint row
    #[error("Checkpoint name '{0}' is used by more than one source")]
    DuplicateCheckpoint(String),

    /// Two document fields map to the same target column
    #[error("Target column '{column}' is mapped twice for source '{source_name}'")]
    DuplicateColumn { source_name: String, column: String },

    /// The configured table list is empty where at least one is required
    #[error("No tables configured")]
    NoTables,

    /// A table was requested that is not configured
    #[error("Table not configured: {0}")]
    TableNotFound(String),
}

// ============================================================================
// Document source
// ============================================================================

/// Mapping of one document field onto one target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field name in the source document
    pub source: String,
    /// Column name in the target table
    pub target: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Document collection replicated by the hash-diff pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSyncConfig {
    /// Source database name
    pub database: String,
    /// Source collection name
    pub collection: String,
    /// Identity field in the source documents
    pub identity_field: String,
    /// Store-assigned fields excluded from the fingerprint (e.g. `_id`)
    pub internal_fields: Vec<String>,
    /// Declared business fields copied to the target
    pub fields: Vec<FieldMapping>,
    /// Target table (schema-qualified)
    pub target_table: String,
    /// Target column receiving the identity
    pub target_identity_column: String,
    /// Target column holding the fingerprint
    pub fingerprint_column: String,
    /// Target column set on first insert only
    pub first_seen_column: String,
    /// Target column refreshed on every write
    pub last_updated_column: String,
    /// Checkpoint row name
    pub checkpoint_name: String,
}

impl Default for DocumentSyncConfig {
    fn default() -> Self {
        Self {
            database: "nomba_users".to_string(),
            collection: "nomba".to_string(),
            identity_field: "Uid".to_string(),
            internal_fields: vec!["_id".to_string()],
            fields: vec![
                FieldMapping::new("firstName", "first_name"),
                FieldMapping::new("lastName", "last_name"),
                FieldMapping::new("occupation", "occupation"),
                FieldMapping::new("state", "state"),
            ],
            target_table: "analytics.raw_users".to_string(),
            target_identity_column: "uid".to_string(),
            fingerprint_column: "record_hash".to_string(),
            first_seen_column: "extracted_at".to_string(),
            last_updated_column: "updated_at".to_string(),
            checkpoint_name: "mongodb_users".to_string(),
        }
    }
}

impl DocumentSyncConfig {
    /// Fields left out of the fingerprint: the identity plus internal fields.
    pub fn fingerprint_exclusions(&self) -> Vec<&str> {
        std::iter::once(self.identity_field.as_str())
            .chain(self.internal_fields.iter().map(String::as_str))
            .collect()
    }

    /// Target column order shared by every record of a batch.
    pub fn target_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.target_identity_column.as_str()];
        columns.extend(self.fields.iter().map(|f| f.target.as_str()));
        columns.push(self.fingerprint_column.as_str());
        columns.push(self.first_seen_column.as_str());
        columns.push(self.last_updated_column.as_str());
        columns
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let required = [
            ("database", &self.database),
            ("collection", &self.collection),
            ("identity_field", &self.identity_field),
            ("target_table", &self.target_table),
            ("target_identity_column", &self.target_identity_column),
            ("fingerprint_column", &self.fingerprint_column),
            ("first_seen_column", &self.first_seen_column),
            ("last_updated_column", &self.last_updated_column),
            ("checkpoint_name", &self.checkpoint_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SchemaError::EmptyIdentifier {
                    source_name: self.checkpoint_name.clone(),
                    field: field.to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for column in self.target_columns() {
            if !seen.insert(column) {
                return Err(SchemaError::DuplicateColumn {
                    source_name: self.checkpoint_name.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Relational source
// ============================================================================

/// One relational table replicated by the watermark pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSyncConfig {
    /// Short name used on the command line and in logs
    pub name: String,
    /// Source table (schema-qualified)
    pub source_table: String,
    /// Target table (schema-qualified)
    pub target_table: String,
    /// Primary-key column shared by source and target
    pub primary_key: String,
    /// Checkpoint row name
    pub checkpoint_name: String,
    /// Last-modified marker column
    #[serde(default = "default_updated_column")]
    pub updated_column: String,
    /// Soft-delete marker column
    #[serde(default = "default_deleted_column")]
    pub deleted_column: String,
    /// Extraction timestamp column added to every target row
    #[serde(default = "default_extracted_column")]
    pub extracted_column: String,
}

fn default_updated_column() -> String {
    "updated_at".to_string()
}

fn default_deleted_column() -> String {
    "deleted_at".to_string()
}

fn default_extracted_column() -> String {
    "extracted_at".to_string()
}

impl TableSyncConfig {
    /// Table config with the conventional marker column names.
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        primary_key: impl Into<String>,
        checkpoint_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: source_table.into(),
            target_table: target_table.into(),
            primary_key: primary_key.into(),
            checkpoint_name: checkpoint_name.into(),
            updated_column: default_updated_column(),
            deleted_column: default_deleted_column(),
            extracted_column: default_extracted_column(),
        }
    }

    /// The savings tables replicated by default.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "savings_plan",
                "public.savings_plan",
                "analytics.raw_savings_plan",
                "plan_id",
                "postgres_savings_plan",
            ),
            Self::new(
                "savingstransaction",
                "public.savingstransaction",
                "analytics.raw_savingstransaction",
                "txn_id",
                "postgres_savingstransaction",
            ),
        ]
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let required = [
            ("name", &self.name),
            ("source_table", &self.source_table),
            ("target_table", &self.target_table),
            ("primary_key", &self.primary_key),
            ("checkpoint_name", &self.checkpoint_name),
            ("updated_column", &self.updated_column),
            ("deleted_column", &self.deleted_column),
            ("extracted_column", &self.extracted_column),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SchemaError::EmptyIdentifier {
                    source_name: self.name.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Reject configurations where two sources would share a checkpoint row.
pub fn ensure_unique_checkpoints<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SchemaError::DuplicateCheckpoint(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_document_config_is_valid() {
        let config = DocumentSyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.target_columns(),
            vec![
                "uid",
                "first_name",
                "last_name",
                "occupation",
                "state",
                "record_hash",
                "extracted_at",
                "updated_at"
            ]
        );
        assert_eq!(config.fingerprint_exclusions(), vec!["Uid", "_id"]);
    }

    #[test]
    fn test_document_config_rejects_duplicate_columns() {
        let mut config = DocumentSyncConfig::default();
        config.fields.push(FieldMapping::new("nickname", "first_name"));
        assert_eq!(
            config.validate(),
            Err(SchemaError::DuplicateColumn {
                source_name: "mongodb_users".into(),
                column: "first_name".into()
            })
        );
    }

    #[test]
    fn test_table_config_rejects_empty_primary_key() {
        let mut table = TableSyncConfig::defaults().remove(0);
        table.primary_key = " ".into();
        assert!(matches!(
            table.validate(),
            Err(SchemaError::EmptyIdentifier { field, .. }) if field == "primary_key"
        ));
    }

    #[test]
    fn test_unique_checkpoints() {
        assert!(ensure_unique_checkpoints(["a", "b"]).is_ok());
        assert_eq!(
            ensure_unique_checkpoints(["a", "b", "a"]),
            Err(SchemaError::DuplicateCheckpoint("a".into()))
        );
    }
}
