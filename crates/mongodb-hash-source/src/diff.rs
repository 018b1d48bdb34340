//! Fingerprint classification of source documents.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use sync_core::{
    identify, ChangeRecord, ChangeSet, Classification, DocumentSyncConfig, Fingerprint, Record,
    SkipReason, UniversalValue,
};

/// Classify one document against the fingerprints stored in the target.
///
/// A document whose identity has no stored fingerprint is an insert; one
/// whose fingerprint differs from the stored one is an update.
pub fn classify(
    record: &Record,
    position: usize,
    config: &DocumentSyncConfig,
    stored: &HashMap<String, Fingerprint>,
    extracted_at: DateTime<Utc>,
) -> Classification {
    let identity = match identify(record, &config.identity_field, position) {
        Ok(identity) => identity,
        Err(reason) => return Classification::Skipped(reason),
    };
    let fingerprint = Fingerprint::compute(record, &config.fingerprint_exclusions());

    let insert = !stored.contains_key(&identity);
    if !insert && stored.get(&identity) == Some(&fingerprint) {
        return Classification::Unchanged;
    }

    let change = ChangeRecord {
        identity,
        fields: record.clone(),
        fingerprint: Some(fingerprint),
        extracted_at,
    };
    if insert {
        Classification::Insert(change)
    } else {
        Classification::Update(change)
    }
}

/// Classify every document of a run.
///
/// The first document carrying an identity wins; later documents with the
/// same identity are skipped so that one batch never touches a row twice.
pub fn diff(
    records: &[Record],
    config: &DocumentSyncConfig,
    stored: &HashMap<String, Fingerprint>,
    extracted_at: DateTime<Utc>,
) -> ChangeSet {
    let mut changes = ChangeSet::new();
    let mut seen = HashSet::new();

    for (position, record) in records.iter().enumerate() {
        let classification = classify(record, position, config, stored, extracted_at);
        let identity = match &classification {
            Classification::Insert(change) | Classification::Update(change) => {
                Some(change.identity.clone())
            }
            Classification::Unchanged => record.identity(&config.identity_field),
            Classification::Skipped(_) => None,
        };
        if let Some(identity) = identity {
            if !seen.insert(identity.clone()) {
                changes.push(Classification::Skipped(SkipReason::DuplicateIdentity {
                    position,
                    identity,
                }));
                continue;
            }
        }
        changes.push(classification);
    }
    changes
}

/// The target row for a change, in [`DocumentSyncConfig::target_columns`] order.
///
/// Mapped fields are copied as read; a field missing from the document is
/// written as null.
pub fn target_record(change: &ChangeRecord, config: &DocumentSyncConfig) -> Record {
    let mut record = Record::new().with(
        config.target_identity_column.as_str(),
        change.identity.as_str(),
    );
    for mapping in &config.fields {
        let value = change
            .fields
            .get(&mapping.source)
            .cloned()
            .unwrap_or(UniversalValue::Null);
        record.insert(mapping.target.as_str(), value);
    }
    let fingerprint = change
        .fingerprint
        .as_ref()
        .map(|f| UniversalValue::from(f.as_str()))
        .unwrap_or(UniversalValue::Null);
    record.insert(config.fingerprint_column.as_str(), fingerprint);
    record.insert(config.first_seen_column.as_str(), change.extracted_at);
    record.insert(config.last_updated_column.as_str(), change.extracted_at);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> DocumentSyncConfig {
        DocumentSyncConfig::default()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn user(uid: &str, occupation: &str) -> Record {
        Record::new()
            .with("_id", format!("oid-{uid}"))
            .with("Uid", uid)
            .with("firstName", "Ada")
            .with("lastName", "Obi")
            .with("occupation", occupation)
            .with("state", "Lagos")
    }

    fn stored_for(records: &[Record]) -> HashMap<String, Fingerprint> {
        let config = config();
        records
            .iter()
            .map(|r| {
                (
                    r.identity("Uid").unwrap(),
                    Fingerprint::compute(r, &config.fingerprint_exclusions()),
                )
            })
            .collect()
    }

    #[test]
    fn test_classify_insert_update_unchanged() {
        let stored = stored_for(&[user("u1", "Trader")]);

        assert!(matches!(
            classify(&user("u2", "Nurse"), 0, &config(), &stored, now()),
            Classification::Insert(_)
        ));
        assert_eq!(
            classify(&user("u1", "Trader"), 0, &config(), &stored, now()),
            Classification::Unchanged
        );
        match classify(&user("u1", "Doctor"), 0, &config(), &stored, now()) {
            Classification::Update(change) => {
                assert_eq!(change.identity, "u1");
                assert_eq!(change.extracted_at, now());
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_id_does_not_count_as_change() {
        let stored = stored_for(&[user("u1", "Trader")]);
        let moved = user("u1", "Trader").with("_id", "another-object-id");
        assert_eq!(
            classify(&moved, 0, &config(), &stored, now()),
            Classification::Unchanged
        );
    }

    #[test]
    fn test_unmapped_field_counts_as_change() {
        let stored = stored_for(&[user("u1", "Trader")]);
        let extended = user("u1", "Trader").with("phone", "0800");
        assert!(matches!(
            classify(&extended, 0, &config(), &stored, now()),
            Classification::Update(_)
        ));
    }

    #[test]
    fn test_missing_identity_is_skipped() {
        let mut record = user("u1", "Trader");
        record.remove("Uid");
        assert_eq!(
            classify(&record, 4, &config(), &HashMap::new(), now()),
            Classification::Skipped(SkipReason::MissingIdentity {
                position: 4,
                field: "Uid".to_string()
            })
        );
    }

    #[test]
    fn test_diff_skips_repeated_identity() {
        let records = vec![
            user("u1", "Trader"),
            user("u2", "Nurse"),
            user("u1", "Doctor"),
        ];
        let changes = diff(&records, &config(), &HashMap::new(), now());
        assert_eq!(changes.inserted, 2);
        assert_eq!(
            changes.skipped,
            vec![SkipReason::DuplicateIdentity {
                position: 2,
                identity: "u1".to_string()
            }]
        );
    }

    #[test]
    fn test_diff_keeps_scan_order() {
        let stored = stored_for(&[user("u2", "Teacher")]);
        let records = vec![
            user("u1", "Trader"),
            user("u2", "Doctor"),
            user("u3", "Nurse"),
        ];
        let changes = diff(&records, &config(), &stored, now());
        assert_eq!((changes.inserted, changes.updated), (2, 1));
        let order: Vec<_> = changes.changes().map(|c| c.identity.as_str()).collect();
        assert_eq!(order, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn test_target_record_columns() {
        let mut record = user("u1", "Trader");
        record.remove("state");
        let change = match classify(&record, 0, &config(), &HashMap::new(), now()) {
            Classification::Insert(change) => change,
            other => panic!("expected insert, got {other:?}"),
        };

        let row = target_record(&change, &config());
        let columns: Vec<_> = row.column_names().collect();
        assert_eq!(columns, config().target_columns());
        assert_eq!(row.get("uid"), Some(&UniversalValue::from("u1")));
        assert_eq!(row.get("state"), Some(&UniversalValue::Null));
        assert_eq!(
            row.get("record_hash"),
            Some(&UniversalValue::from(
                change.fingerprint.as_ref().unwrap().as_str()
            ))
        );
        assert_eq!(row.get("extracted_at"), Some(&UniversalValue::TimestampTz(now())));
        assert_eq!(row.get("updated_at"), Some(&UniversalValue::TimestampTz(now())));
    }
}
