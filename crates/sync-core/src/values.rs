//! Value representation shared by every source and target.
//!
//! `UniversalValue` is the intermediate value produced by the source readers
//! (BSON documents, PostgreSQL rows) and consumed by the upsert writer. It keeps
//! enough type information for the target driver to bind parameters without
//! guessing, and it has one canonical JSON rendering used for fingerprinting.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A single field or column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UniversalValue {
    /// SQL NULL / BSON null / missing
    Null,

    /// Boolean value
    Bool(bool),

    /// 16-bit signed integer
    Int16(i16),

    /// 32-bit signed integer
    Int32(i32),

    /// 64-bit signed integer
    Int64(i64),

    /// 32-bit floating point
    Float32(f32),

    /// 64-bit floating point
    Float64(f64),

    /// Exact decimal kept in its textual form to preserve precision
    Decimal(String),

    /// Text value
    String(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// UUID value
    Uuid(Uuid),

    /// Date without time
    Date(NaiveDate),

    /// Timestamp without time zone, interpreted as UTC
    Timestamp(NaiveDateTime),

    /// Timestamp with time zone
    TimestampTz(DateTime<Utc>),

    /// Raw JSON document (PostgreSQL json/jsonb)
    Json(serde_json::Value),

    /// Ordered list of values
    Array(Vec<UniversalValue>),

    /// Embedded document
    Object(BTreeMap<String, UniversalValue>),
}

impl UniversalValue {
    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an instant in UTC.
    ///
    /// Naive timestamps and dates are taken to be UTC.
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TimestampTz(dt) => Some(*dt),
            Self::Timestamp(ts) => Some(DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc)),
            Self::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(|ts| DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc)),
            _ => None,
        }
    }

    /// Try to get this value as an i64, widening smaller integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(i) => Some(*i as i64),
            Self::Int32(i) => Some(*i as i64),
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Render the value as the key string used to match records by identity.
    ///
    /// Returns `None` for null and for composite values, which cannot act as keys.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Self::Null | Self::Array(_) | Self::Object(_) | Self::Json(_) => None,
            other => Some(other.to_text()),
        }
    }

    /// Render the value as plain text.
    ///
    /// Strings are returned verbatim (no quotes); composite values are rendered
    /// as canonical JSON.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int16(i) => i.to_string(),
            Self::Int32(i) => i.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::Float32(f) => f.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Decimal(d) => d.clone(),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => hex::encode(b),
            Self::Uuid(u) => u.to_string(),
            Self::Date(d) => d.to_string(),
            Self::Timestamp(ts) => ts.to_string(),
            Self::TimestampTz(dt) => dt.to_rfc3339(),
            Self::Json(_) | Self::Array(_) | Self::Object(_) => self.to_canonical_json().to_string(),
        }
    }

    /// Canonical JSON rendering.
    ///
    /// JSON-native values stay native; everything else (decimals, UUIDs,
    /// timestamps, bytes) is coerced to a string. Object keys are emitted in
    /// sorted order regardless of the source order.
    pub fn to_canonical_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int16(i) => Value::from(*i),
            Self::Int32(i) => Value::from(*i),
            Self::Int64(i) => Value::from(*i),
            Self::Float32(f) => float_to_json(*f as f64),
            Self::Float64(f) => float_to_json(*f),
            Self::Json(json) => canonicalize_json(json),
            Self::Array(values) => {
                Value::Array(values.iter().map(|v| v.to_canonical_json()).collect())
            }
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_canonical_json()))
                    .collect(),
            ),
            other => Value::String(other.to_text()),
        }
    }
}

impl fmt::Display for UniversalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl From<&str> for UniversalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for UniversalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for UniversalValue {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<bool> for UniversalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for UniversalValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::TimestampTz(dt)
    }
}

impl<T: Into<UniversalValue>> From<Option<T>> for UniversalValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

// NaN and infinities have no JSON number form.
fn float_to_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(f.to_string()))
}

/// Rebuild a JSON value with every object's keys in sorted order.
fn canonicalize_json(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize_json(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_naive_timestamp_is_utc() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let value = UniversalValue::Timestamp(naive);
        assert_eq!(
            value.as_utc(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_non_temporal_values_have_no_instant() {
        assert_eq!(UniversalValue::String("2024-01-01".into()).as_utc(), None);
        assert_eq!(UniversalValue::Null.as_utc(), None);
    }

    #[test]
    fn test_key_string() {
        assert_eq!(
            UniversalValue::String("u1".into()).to_key_string(),
            Some("u1".to_string())
        );
        assert_eq!(
            UniversalValue::Int32(7).to_key_string(),
            Some("7".to_string())
        );
        assert_eq!(UniversalValue::Null.to_key_string(), None);
        assert_eq!(UniversalValue::Array(vec![]).to_key_string(), None);
    }

    #[test]
    fn test_canonical_json_coerces_non_json_types() {
        let uuid = Uuid::nil();
        assert_eq!(
            UniversalValue::Uuid(uuid).to_canonical_json(),
            serde_json::Value::String(uuid.to_string())
        );
        assert_eq!(
            UniversalValue::Decimal("12.50".into()).to_canonical_json(),
            serde_json::Value::String("12.50".into())
        );
        assert_eq!(
            UniversalValue::Int32(5).to_canonical_json(),
            serde_json::json!(5)
        );
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let json = serde_json::json!({"b": 1, "a": {"z": true, "y": null}});
        let rendered = UniversalValue::Json(json).to_canonical_json().to_string();
        assert_eq!(rendered, r#"{"a":{"y":null,"z":true},"b":1}"#);
    }

    #[test]
    fn test_nan_does_not_panic() {
        let rendered = UniversalValue::Float64(f64::NAN).to_canonical_json();
        assert_eq!(rendered, serde_json::Value::String("NaN".into()));
    }
}
