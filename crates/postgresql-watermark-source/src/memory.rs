//! In-memory [`WatermarkSource`] for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use checkpoint::Watermark;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use sync_core::{Record, TableSyncConfig};

use crate::source::{change_marker, qualifies, WatermarkSource};

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<String, Vec<Record>>,
    unavailable: BTreeSet<String>,
}

/// Source tables held in memory, keyed by source table name.
#[derive(Debug, Default)]
pub struct MemoryWatermarkSource {
    tables: Mutex<Tables>,
}

impl MemoryWatermarkSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `record` into `source_table`, replacing the row with the same
    /// `primary_key` value.
    pub fn put(&self, source_table: &str, primary_key: &str, record: Record) {
        let mut tables = self.lock();
        let rows = tables.rows.entry(source_table.to_string()).or_default();
        let key = record.identity(primary_key);
        match rows
            .iter_mut()
            .find(|existing| key.is_some() && existing.identity(primary_key) == key)
        {
            Some(existing) => *existing = record,
            None => rows.push(record),
        }
    }

    /// Make reads of `source_table` fail.
    pub fn make_unavailable(&self, source_table: &str) {
        self.lock().unavailable.insert(source_table.to_string());
    }
}

#[async_trait]
impl WatermarkSource for MemoryWatermarkSource {
    async fn fetch_changes(&self, table: &TableSyncConfig, since: Watermark) -> Result<Vec<Record>> {
        let tables = self.lock();
        if tables.unavailable.contains(&table.source_table) {
            return Err(anyhow!("relation \"{}\" is unreachable", table.source_table));
        }

        let mut rows: Vec<Record> = tables
            .rows
            .get(&table.source_table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| qualifies(row, table, since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            change_marker(a, table)
                .cmp(&change_marker(b, table))
                .then_with(|| a.identity(&table.primary_key).cmp(&b.identity(&table.primary_key)))
        });
        Ok(rows)
    }
}
