//! Ordered field/column maps.

use crate::values::UniversalValue;
use serde::{Deserialize, Serialize};

/// A source or target record: an ordered list of named values.
///
/// Order is preserved from the source (document field order, result-set
/// column order) so that a batch built from rows of one query has the same
/// column order in every record. Lookups are linear; records are small.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, UniversalValue)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<UniversalValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<UniversalValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<UniversalValue> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&UniversalValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Check whether the record carries a field (even a null one).
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Field names in record order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over `(name, value)` pairs in record order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniversalValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if both records have exactly the same field names in the same order.
    pub fn same_columns(&self, other: &Record) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|((a, _), (b, _))| a == b)
    }

    /// Identity of this record under `field`, if present and non-empty.
    pub fn identity(&self, field: &str) -> Option<String> {
        self.get(field)
            .and_then(UniversalValue::to_key_string)
            .filter(|id| !id.is_empty())
    }
}

impl FromIterator<(String, UniversalValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, UniversalValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, UniversalValue);
    type IntoIter = std::vec::IntoIter<(String, UniversalValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
