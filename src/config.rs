//! Run configuration file.

use analytics_sync_postgresql::DEFAULT_CHECKPOINT_TABLE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use sync_core::{ensure_unique_checkpoints, DocumentSyncConfig, SchemaError, TableSyncConfig};

/// Sources replicated by one deployment.
///
/// Every section is optional in the TOML file; missing sections fall back to
/// the built-in deployment (the users collection and the two savings tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Schema-qualified checkpoint table
    pub checkpoint_table: String,
    /// Document collection for the hash-diff pipeline
    pub mongodb: DocumentSyncConfig,
    /// Tables for the watermark pipeline, in processing order
    pub tables: Vec<TableSyncConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            checkpoint_table: DEFAULT_CHECKPOINT_TABLE.to_string(),
            mongodb: DocumentSyncConfig::default(),
            tables: TableSyncConfig::defaults(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the built-in configuration when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("No configuration file given, using built-in defaults");
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.checkpoint_table.trim().is_empty() {
            return Err(SchemaError::EmptyIdentifier {
                source_name: "checkpoints".to_string(),
                field: "checkpoint_table".to_string(),
            });
        }
        self.mongodb.validate()?;
        if self.tables.is_empty() {
            return Err(SchemaError::NoTables);
        }
        for table in &self.tables {
            table.validate()?;
        }
        ensure_unique_checkpoints(self.checkpoint_names())
    }

    /// Checkpoint row names of every configured source.
    pub fn checkpoint_names(&self) -> Vec<&str> {
        std::iter::once(self.mongodb.checkpoint_name.as_str())
            .chain(self.tables.iter().map(|t| t.checkpoint_name.as_str()))
            .collect()
    }

    /// The tables named in `names`, in the order given; all tables if empty.
    pub fn select_tables(&self, names: &[String]) -> Result<Vec<TableSyncConfig>, SchemaError> {
        if names.is_empty() {
            return Ok(self.tables.clone());
        }
        names
            .iter()
            .map(|name| {
                self.tables
                    .iter()
                    .find(|t| &t.name == name)
                    .cloned()
                    .ok_or_else(|| SchemaError::TableNotFound(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sample_file_matches_defaults() {
        let config = AppConfig::from_toml_str(include_str!("../analytics-sync.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [mongodb]
            collection = "customers"
            "#,
        )
        .unwrap();
        assert_eq!(config.mongodb.collection, "customers");
        assert_eq!(config.mongodb.identity_field, "Uid");
        assert_eq!(config.tables, TableSyncConfig::defaults());
        assert_eq!(config.checkpoint_table, "analytics.cdc_metadata");
    }

    #[test]
    fn test_table_marker_columns_default() {
        let config = AppConfig::from_toml_str(
            r#"
            [[tables]]
            name = "loans"
            source_table = "public.loans"
            target_table = "analytics.raw_loans"
            primary_key = "loan_id"
            checkpoint_name = "postgres_loans"
            "#,
        )
        .unwrap();
        assert_eq!(config.tables.len(), 1);
        assert_eq!(config.tables[0].updated_column, "updated_at");
        assert_eq!(config.tables[0].deleted_column, "deleted_at");
    }

    #[test]
    fn test_duplicate_checkpoint_rejected() {
        let err = AppConfig::from_toml_str(
            r#"
            [mongodb]
            checkpoint_name = "postgres_savings_plan"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::DuplicateCheckpoint(
                "postgres_savings_plan".to_string()
            ))
        );
    }

    #[test]
    fn test_empty_primary_key_rejected() {
        let err = AppConfig::from_toml_str(
            r#"
            [[tables]]
            name = "loans"
            source_table = "public.loans"
            target_table = "analytics.raw_loans"
            primary_key = ""
            checkpoint_name = "postgres_loans"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::EmptyIdentifier { field, .. }) if field == "primary_key"
        ));
    }

    #[test]
    fn test_empty_table_list_rejected() {
        let err = AppConfig::from_toml_str("tables = []").unwrap_err();
        assert_eq!(err.downcast_ref::<SchemaError>(), Some(&SchemaError::NoTables));
    }

    #[test]
    fn test_select_tables() {
        let config = AppConfig::default();
        assert_eq!(config.select_tables(&[]).unwrap().len(), 2);

        let selected = config
            .select_tables(&["savingstransaction".to_string()])
            .unwrap();
        assert_eq!(selected[0].source_table, "public.savingstransaction");

        assert_eq!(
            config.select_tables(&["loans".to_string()]),
            Err(SchemaError::TableNotFound("loans".to_string()))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "checkpoint_table = \"ops.sync_state\"").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.checkpoint_table, "ops.sync_state");
        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
        assert!(AppConfig::load(Some(Path::new("/nonexistent/analytics-sync.toml"))).is_err());
    }
}
