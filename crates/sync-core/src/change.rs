//! Per-run change sets and their summaries.

use crate::fingerprint::Fingerprint;
use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A record that must be written to the target in this run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Identity (document `Uid` or row primary key) rendered as a key string
    pub identity: String,
    /// Current field values
    pub fields: Record,
    /// New fingerprint (hash pipeline only)
    pub fingerprint: Option<Fingerprint>,
    /// When this run extracted the record
    pub extracted_at: DateTime<Utc>,
}

/// Why a source record was left out of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The identity field is not present at all.
    MissingIdentity { position: usize, field: String },
    /// The identity field is present but null or empty.
    EmptyIdentity { position: usize, field: String },
    /// An earlier record of the same run has the same identity.
    DuplicateIdentity { position: usize, identity: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingIdentity { position, field } => {
                write!(f, "record #{position} has no '{field}' field")
            }
            SkipReason::EmptyIdentity { position, field } => {
                write!(f, "record #{position} has an empty '{field}' field")
            }
            SkipReason::DuplicateIdentity { position, identity } => {
                write!(f, "record #{position} repeats identity '{identity}'")
            }
        }
    }
}

/// Identity of the record at `position`, or why it has none.
pub fn identify(record: &Record, field: &str, position: usize) -> Result<String, SkipReason> {
    if !record.contains(field) {
        return Err(SkipReason::MissingIdentity {
            position,
            field: field.to_string(),
        });
    }
    record
        .identity(field)
        .ok_or_else(|| SkipReason::EmptyIdentity {
            position,
            field: field.to_string(),
        })
}

/// Outcome of comparing one source record against the target.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Insert(ChangeRecord),
    Update(ChangeRecord),
    Unchanged,
    Skipped(SkipReason),
}

/// All decisions of one run.
///
/// Inserts and updates are kept together in the order they were classified,
/// which is the order they are written in. Unchanged records are only
/// counted; skipped records keep their reason so callers can audit them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pending: Vec<ChangeRecord>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: Vec<SkipReason>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classification into the set.
    pub fn push(&mut self, classification: Classification) {
        match classification {
            Classification::Insert(change) => {
                self.inserted += 1;
                self.pending.push(change);
            }
            Classification::Update(change) => {
                self.updated += 1;
                self.pending.push(change);
            }
            Classification::Unchanged => self.unchanged += 1,
            Classification::Skipped(reason) => self.skipped.push(reason),
        }
    }

    /// Inserts and updates in classification order.
    pub fn changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.pending.iter()
    }

    /// Number of records that will be written.
    pub fn change_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }
}

/// Summary of one successful (or dry) pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Logical source (checkpoint) name
    pub source_name: String,
    /// Records read from the source
    pub records_read: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Rows written by the upsert writer
    pub upserted: u64,
    /// Watermark stored in the checkpoint after this run
    pub watermark: Option<DateTime<Utc>>,
    /// True if the transaction was rolled back on purpose
    pub dry_run: bool,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            records_read: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            upserted: 0,
            watermark: None,
            dry_run: false,
            elapsed: Duration::ZERO,
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} read, {} inserted, {} updated, {} unchanged, {} skipped, {} upserted in {:.2}s",
            self.source_name,
            self.records_read,
            self.inserted,
            self.updated,
            self.unchanged,
            self.skipped,
            self.upserted,
            self.elapsed.as_secs_f64()
        )?;
        if self.dry_run {
            f.write_str(" (dry run, rolled back)")?;
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
