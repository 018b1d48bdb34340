//! Uniform batches of records for the upsert writer.

use std::collections::BTreeSet;
use sync_core::{Record, SyncError, UniversalValue};

/// A batch of records sharing one column set, addressed to one target table.
///
/// The column list is taken from the first record; every other record must
/// carry exactly the same columns in the same order. Rows are stored
/// positionally so drivers can bind them without per-row lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertBatch {
    table: String,
    primary_key: String,
    columns: Vec<String>,
    rows: Vec<Vec<UniversalValue>>,
    insert_only: BTreeSet<String>,
}

impl UpsertBatch {
    /// Build a batch, validating the uniform-columns and primary-key preconditions.
    pub fn from_records(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        records: Vec<Record>,
    ) -> Result<Self, SyncError> {
        let table = table.into();
        let primary_key = primary_key.into();

        let Some(first) = records.first() else {
            return Ok(Self {
                table,
                primary_key,
                columns: Vec::new(),
                rows: Vec::new(),
                insert_only: BTreeSet::new(),
            });
        };

        let columns: Vec<String> = first.column_names().map(str::to_string).collect();

        for (position, record) in records.iter().enumerate() {
            if !record.same_columns(first) {
                return Err(SyncError::NonUniformBatch {
                    table,
                    position,
                    expected: columns.join(", "),
                    found: record.column_names().collect::<Vec<_>>().join(", "),
                });
            }
            if record.identity(&primary_key).is_none() {
                return Err(SyncError::MissingPrimaryKey {
                    table,
                    position,
                    primary_key,
                });
            }
        }

        let rows = records
            .into_iter()
            .map(|record| record.into_iter().map(|(_, value)| value).collect())
            .collect();

        Ok(Self {
            table,
            primary_key,
            columns,
            rows,
            insert_only: BTreeSet::new(),
        })
    }

    /// Mark columns that are written on insert but left untouched on conflict.
    ///
    /// Names that are not columns of the batch, and the primary key, are ignored.
    pub fn with_insert_only<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if column != self.primary_key && self.columns.contains(&column) {
                self.insert_only.insert(column);
            }
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<UniversalValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_insert_only(&self, column: &str) -> bool {
        self.insert_only.contains(column)
    }

    /// Columns overwritten when the primary key already exists.
    pub fn update_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| *c != self.primary_key && !self.insert_only.contains(*c))
            .collect()
    }

    /// Rows re-assembled as named records.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<Record>()
        })
    }
}
