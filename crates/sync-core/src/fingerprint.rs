//! Content fingerprints for change detection without timestamps.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// MD5 hex digest over a record's canonical, identity-free serialization.
///
/// The digest is computed over a JSON object whose keys are sorted, so field
/// order in the source never affects it. The identity field and any
/// store-internal fields passed as `excluded` do not take part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `record`, ignoring the `excluded` fields.
    pub fn compute(record: &Record, excluded: &[&str]) -> Self {
        let canonical = canonical_form(record, excluded);
        let digest = md5::compute(canonical.as_bytes());
        Self(hex::encode(digest.0))
    }

    /// Wrap a digest previously persisted in the target.
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorted-key JSON serialization of the non-excluded fields.
pub fn canonical_form(record: &Record, excluded: &[&str]) -> String {
    let sorted: BTreeMap<&str, serde_json::Value> = record
        .iter()
        .filter(|(name, _)| !excluded.contains(name))
        .map(|(name, value)| (name, value.to_canonical_json()))
        .collect();
    // BTreeMap<&str, Value> always serializes; the fallback is unreachable in practice.
    serde_json::to_string(&sorted).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::UniversalValue;

    fn user(uid: &str, occupation: &str) -> Record {
        Record::new()
            .with("Uid", uid)
            .with("firstName", "Ada")
            .with("occupation", occupation)
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let record = user("u1", "Trader");
        assert_eq!(
            Fingerprint::compute(&record, &["Uid"]),
            Fingerprint::compute(&record, &["Uid"])
        );
    }

    #[test]
    fn test_fingerprint_ignores_field_order() {
        let a = user("u1", "Trader");
        let b = Record::new()
            .with("occupation", "Trader")
            .with("Uid", "u1")
            .with("firstName", "Ada");
        assert_eq!(
            Fingerprint::compute(&a, &["Uid"]),
            Fingerprint::compute(&b, &["Uid"])
        );
    }

    #[test]
    fn test_fingerprint_ignores_identity() {
        assert_eq!(
            Fingerprint::compute(&user("u1", "Trader"), &["Uid"]),
            Fingerprint::compute(&user("u2", "Trader"), &["Uid"])
        );
    }

    #[test]
    fn test_fingerprint_detects_value_change() {
        assert_ne!(
            Fingerprint::compute(&user("u1", "Trader"), &["Uid"]),
            Fingerprint::compute(&user("u1", "Teacher"), &["Uid"])
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_types() {
        let a = Record::new().with("n", UniversalValue::Int64(1));
        let b = Record::new().with("n", UniversalValue::String("1".into()));
        assert_ne!(Fingerprint::compute(&a, &[]), Fingerprint::compute(&b, &[]));
    }

    #[test]
    fn test_fingerprint_detects_null_versus_missing() {
        let a = Record::new().with("n", UniversalValue::Null);
        let b = Record::new();
        assert_ne!(Fingerprint::compute(&a, &[]), Fingerprint::compute(&b, &[]));
    }

    #[test]
    fn test_fingerprint_is_md5_hex() {
        let fp = Fingerprint::compute(&Record::new(), &[]);
        // md5("{}")
        assert_eq!(fp.as_str(), "99914b932bd37a50b983c5e7c90ae93b");
    }

    #[test]
    fn test_canonical_form_excludes_internal_fields() {
        let record = Record::new()
            .with("_id", "65f0")
            .with("Uid", "u1")
            .with("b", 2i64)
            .with("a", 1i64);
        assert_eq!(canonical_form(&record, &["Uid", "_id"]), r#"{"a":1,"b":2}"#);
    }
}
