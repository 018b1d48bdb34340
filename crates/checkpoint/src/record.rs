//! Checkpoint rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Watermark;

/// Outcome recorded by the last run of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Success,
    Failure,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Success => "success",
            CheckpointStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(CheckpointStatus::Success),
            "failure" | "failed" => Ok(CheckpointStatus::Failure),
            other => Err(anyhow::anyhow!("Unknown checkpoint status: {other}")),
        }
    }
}

/// One row of the checkpoint table.
///
/// Seeded rows carry no watermark and no status until the first successful
/// run of their source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Logical source name (unique key)
    pub source_name: String,
    /// Last extracted watermark
    pub last_extracted: Option<DateTime<Utc>>,
    /// Status of the last run
    pub last_status: Option<CheckpointStatus>,
    /// Records extracted by the last run
    pub records_extracted: i64,
    /// When the row was last written
    pub updated_at: Option<DateTime<Utc>>,
}

impl CheckpointRecord {
    /// A freshly seeded row.
    pub fn seed(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            last_extracted: None,
            last_status: None,
            records_extracted: 0,
            updated_at: None,
        }
    }

    /// The row written at the end of a successful run.
    pub fn success(source_name: impl Into<String>, watermark: Watermark, count: u64) -> Self {
        Self {
            source_name: source_name.into(),
            last_extracted: Some(watermark.instant()),
            last_status: Some(CheckpointStatus::Success),
            records_extracted: i64::try_from(count).unwrap_or(i64::MAX),
            updated_at: Some(Utc::now()),
        }
    }

    /// Stored watermark, or the epoch sentinel.
    pub fn watermark(&self) -> Watermark {
        self.last_extracted
            .map(Watermark::new)
            .unwrap_or_else(Watermark::epoch)
    }
}
