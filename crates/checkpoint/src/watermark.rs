//! Watermark: the instant up to which a source has been replicated.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Replication progress of one source.
///
/// Watermarks only move forward: [`Watermark::advance`] never returns an
/// earlier instant than the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// The "beginning of time" sentinel used when no run has succeeded yet.
    pub fn epoch() -> Self {
        Self(Utc.timestamp_opt(0, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_epoch(&self) -> bool {
        *self == Self::epoch()
    }

    /// Move forward to `candidate` if it is later; otherwise stay.
    pub fn advance(self, candidate: DateTime<Utc>) -> Self {
        Self(self.0.max(candidate))
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::epoch()
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}
