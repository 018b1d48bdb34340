//! In-memory transactional target.
//!
//! `MemoryTarget` behaves like a tiny database: each transaction works on a
//! private copy of the committed state, and `commit` publishes that copy in
//! one step. Faults can be injected to simulate write errors part-way
//! through a batch, failing checkpoint writes and failing commits.

use anyhow::{anyhow, Result};
use checkpoint::{CheckpointRecord, CheckpointStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_core::{Fingerprint, Record};

use crate::{AnalyticsSink, Target, TargetTransaction, UpsertBatch};

/// A table keyed by the string form of its primary key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub primary_key: String,
    pub rows: BTreeMap<String, Record>,
}

/// Committed contents of the target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub tables: BTreeMap<String, MemoryTable>,
    pub checkpoints: BTreeMap<String, CheckpointRecord>,
}

/// Faults to inject into subsequent transactions.
#[derive(Debug, Clone, Default)]
struct FaultPlan {
    /// Fail an upsert into this table after applying this many rows
    upsert: Option<(String, usize)>,
    checkpoint_write: bool,
    fingerprint_load: bool,
    commit: bool,
}

#[derive(Debug, Default)]
struct Counters {
    commits: usize,
    rollbacks: usize,
    upsert_statements: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: MemoryState,
    faults: FaultPlan,
    counters: Counters,
}

/// In-memory [`Target`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> MemoryState {
        self.lock().state.clone()
    }

    /// Committed rows of `table`, ordered by primary key.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock()
            .state
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed row of `table` with primary key `key`.
    pub fn row(&self, table: &str, key: &str) -> Option<Record> {
        self.lock()
            .state
            .tables
            .get(table)
            .and_then(|t| t.rows.get(key).cloned())
    }

    /// Committed checkpoint row for `source_name`.
    pub fn checkpoint(&self, source_name: &str) -> Option<CheckpointRecord> {
        self.lock().state.checkpoints.get(source_name).cloned()
    }

    /// Make the next upserts into `table` fail after `applied_rows` rows.
    pub fn fail_upsert_after(&self, table: &str, applied_rows: usize) {
        self.lock().faults.upsert = Some((table.to_string(), applied_rows));
    }

    /// Make checkpoint writes fail.
    pub fn fail_checkpoint_write(&self) {
        self.lock().faults.checkpoint_write = true;
    }

    /// Make fingerprint snapshots fail.
    pub fn fail_fingerprint_load(&self) {
        self.lock().faults.fingerprint_load = true;
    }

    /// Make commits fail.
    pub fn fail_commit(&self) {
        self.lock().faults.commit = true;
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.lock().faults = FaultPlan::default();
    }

    pub fn commits(&self) -> usize {
        self.lock().counters.commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().counters.rollbacks
    }

    /// Number of upsert statements executed, committed or not.
    pub fn upsert_statements(&self) -> usize {
        self.lock().counters.upsert_statements
    }
}

#[async_trait::async_trait]
impl Target for MemoryTarget {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let working = self.snapshot();
        Ok(MemoryTransaction {
            target: self.clone(),
            working,
        })
    }
}

/// Open transaction on a [`MemoryTarget`]; dropping it discards its writes.
#[derive(Debug)]
pub struct MemoryTransaction {
    target: MemoryTarget,
    working: MemoryState,
}

impl MemoryTransaction {
    /// Uncommitted view of `table` as seen inside this transaction.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.working
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Apply one record to a table with last-write-wins semantics.
fn upsert_record(table: &mut MemoryTable, batch: &UpsertBatch, record: Record) -> Result<()> {
    let key = record
        .identity(batch.primary_key())
        .ok_or_else(|| anyhow!("record has no primary key '{}'", batch.primary_key()))?;

    match table.rows.get_mut(&key) {
        Some(existing) => {
            for (column, value) in record {
                if column == batch.primary_key() || batch.is_insert_only(&column) {
                    continue;
                }
                existing.insert(column, value);
            }
        }
        None => {
            table.rows.insert(key, record);
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl AnalyticsSink for MemoryTransaction {
    async fn upsert_batch(&mut self, batch: &UpsertBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let fault = {
            let mut shared = self.target.lock();
            shared.counters.upsert_statements += 1;
            shared
                .faults
                .upsert
                .clone()
                .filter(|(table, _)| table == batch.table())
        };

        let table = self
            .working
            .tables
            .entry(batch.table().to_string())
            .or_insert_with(|| MemoryTable {
                primary_key: batch.primary_key().to_string(),
                rows: BTreeMap::new(),
            });

        for (applied, record) in batch.records().enumerate() {
            if let Some((_, fail_after)) = &fault {
                if applied >= *fail_after {
                    return Err(anyhow!(
                        "simulated write failure on '{}' after {applied} rows",
                        batch.table()
                    ));
                }
            }
            upsert_record(table, batch, record)?;
        }

        Ok(batch.len() as u64)
    }

    async fn load_fingerprints(
        &mut self,
        table: &str,
        identity_column: &str,
        fingerprint_column: &str,
    ) -> Result<HashMap<String, Fingerprint>> {
        if self.target.lock().faults.fingerprint_load {
            return Err(anyhow!("simulated failure reading '{table}'"));
        }

        let Some(table) = self.working.tables.get(table) else {
            return Ok(HashMap::new());
        };

        Ok(table
            .rows
            .values()
            .filter_map(|row| {
                let identity = row.identity(identity_column)?;
                let fingerprint = row.get(fingerprint_column)?.as_str()?;
                Some((identity, Fingerprint::from_stored(fingerprint)))
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryTransaction {
    async fn read_checkpoint(&mut self, source_name: &str) -> Result<Option<CheckpointRecord>> {
        Ok(self.working.checkpoints.get(source_name).cloned())
    }

    async fn write_checkpoint(&mut self, record: &CheckpointRecord) -> Result<()> {
        if self.target.lock().faults.checkpoint_write {
            return Err(anyhow!(
                "simulated failure writing checkpoint '{}'",
                record.source_name
            ));
        }
        self.working
            .checkpoints
            .insert(record.source_name.clone(), record.clone());
        Ok(())
    }

    async fn seed_checkpoint(&mut self, source_name: &str) -> Result<bool> {
        if self.working.checkpoints.contains_key(source_name) {
            return Ok(false);
        }
        self.working.checkpoints.insert(
            source_name.to_string(),
            CheckpointRecord::seed(source_name),
        );
        Ok(true)
    }

    async fn list_checkpoints(&mut self) -> Result<Vec<CheckpointRecord>> {
        Ok(self.working.checkpoints.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl TargetTransaction for MemoryTransaction {
    async fn commit(self) -> Result<()> {
        let mut shared = self.target.lock();
        if shared.faults.commit {
            shared.counters.rollbacks += 1;
            return Err(anyhow!("simulated commit failure"));
        }
        shared.state = self.working;
        shared.counters.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.target.lock().counters.rollbacks += 1;
        Ok(())
    }
}
