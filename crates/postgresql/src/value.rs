//! Conversion between PostgreSQL values and [`UniversalValue`].
//!
//! Reading uses the result column's type. Writing is driven by the parameter
//! types of a prepared statement, so a value read from one table can be bound
//! to a target column of a compatible but different type (an `int4` into a
//! `bigint`, a naive timestamp into a `timestamptz`, any scalar into `text`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use sync_core::{Record, UniversalValue};
use thiserror::Error;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

/// Errors converting values to or from PostgreSQL.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("failed to read column '{column}': {cause}")]
    Read {
        column: String,
        cause: tokio_postgres::Error,
    },

    #[error("unsupported PostgreSQL type {pg_type} in column '{column}'")]
    UnsupportedColumn { column: String, pg_type: String },

    #[error("cannot bind {value:?} to a {pg_type} parameter")]
    Incompatible { value: String, pg_type: String },

    #[error("value {value} is out of range for {pg_type}")]
    OutOfRange { value: String, pg_type: String },

    #[error("unsupported PostgreSQL parameter type {0}")]
    UnsupportedParameter(String),
}

/// A boxed statement parameter.
pub type SqlParam = Box<dyn ToSql + Sync + Send>;

// ============================================================================
// Reading
// ============================================================================

/// Convert every column of `row` in result-set order.
pub fn row_to_record(row: &Row) -> Result<Record, ValueError> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(column.name(), convert_postgres_value(row, index)?);
    }
    Ok(record)
}

fn read<'a, T>(row: &'a Row, index: usize) -> Result<Option<T>, ValueError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(index)
        .map_err(|cause| ValueError::Read {
            column: row.columns()[index].name().to_string(),
            cause,
        })
}

fn or_null<T>(value: Option<T>, f: impl FnOnce(T) -> UniversalValue) -> UniversalValue {
    value.map(f).unwrap_or(UniversalValue::Null)
}

fn array<T>(
    value: Option<Vec<T>>,
    f: impl Fn(T) -> UniversalValue,
) -> UniversalValue {
    or_null(value, |items| {
        UniversalValue::Array(items.into_iter().map(f).collect())
    })
}

/// Convert the value at `index` of `row`.
pub fn convert_postgres_value(row: &Row, index: usize) -> Result<UniversalValue, ValueError> {
    let column = &row.columns()[index];
    let pg_type = column.type_();

    let value = match *pg_type {
        Type::BOOL => or_null(read::<bool>(row, index)?, UniversalValue::Bool),
        Type::INT2 => or_null(read::<i16>(row, index)?, UniversalValue::Int16),
        Type::INT4 => or_null(read::<i32>(row, index)?, UniversalValue::Int32),
        Type::INT8 => or_null(read::<i64>(row, index)?, UniversalValue::Int64),
        Type::FLOAT4 => or_null(read::<f32>(row, index)?, UniversalValue::Float32),
        Type::FLOAT8 => or_null(read::<f64>(row, index)?, UniversalValue::Float64),
        Type::NUMERIC => or_null(read::<Decimal>(row, index)?, |d| {
            UniversalValue::Decimal(d.to_string())
        }),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            or_null(read::<String>(row, index)?, UniversalValue::String)
        }
        Type::TIMESTAMP => or_null(read::<NaiveDateTime>(row, index)?, UniversalValue::Timestamp),
        Type::TIMESTAMPTZ => {
            or_null(read::<DateTime<Utc>>(row, index)?, UniversalValue::TimestampTz)
        }
        Type::DATE => or_null(read::<NaiveDate>(row, index)?, UniversalValue::Date),
        Type::TIME => or_null(read::<NaiveTime>(row, index)?, |t| {
            UniversalValue::String(t.to_string())
        }),
        Type::JSON | Type::JSONB => {
            or_null(read::<serde_json::Value>(row, index)?, UniversalValue::Json)
        }
        Type::UUID => or_null(read::<uuid::Uuid>(row, index)?, UniversalValue::Uuid),
        Type::BYTEA => or_null(read::<Vec<u8>>(row, index)?, UniversalValue::Bytes),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            array(read::<Vec<String>>(row, index)?, UniversalValue::String)
        }
        Type::INT4_ARRAY => array(read::<Vec<i32>>(row, index)?, UniversalValue::Int32),
        Type::INT8_ARRAY => array(read::<Vec<i64>>(row, index)?, UniversalValue::Int64),
        Type::FLOAT8_ARRAY => array(read::<Vec<f64>>(row, index)?, UniversalValue::Float64),
        Type::BOOL_ARRAY => array(read::<Vec<bool>>(row, index)?, UniversalValue::Bool),
        _ => match row.try_get::<_, Option<String>>(index) {
            // Other text-like types (citext, ltree).
            Ok(value) => or_null(value, UniversalValue::String),
            Err(_) => {
                return Err(ValueError::UnsupportedColumn {
                    column: column.name().to_string(),
                    pg_type: pg_type.to_string(),
                })
            }
        },
    };
    Ok(value)
}

// ============================================================================
// Writing
// ============================================================================

fn incompatible(value: &UniversalValue, ty: &Type) -> ValueError {
    ValueError::Incompatible {
        value: value.to_text(),
        pg_type: ty.to_string(),
    }
}

fn out_of_range(value: impl ToString, ty: &Type) -> ValueError {
    ValueError::OutOfRange {
        value: value.to_string(),
        pg_type: ty.to_string(),
    }
}

fn param<T: ToSql + Sync + Send + 'static>(value: Option<T>) -> SqlParam {
    Box::new(value)
}

fn bind_bool(value: &UniversalValue, ty: &Type) -> Result<Option<bool>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Bool(b) => Ok(Some(*b)),
        UniversalValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(Some(true)),
            "false" | "f" | "0" | "no" => Ok(Some(false)),
            _ => Err(incompatible(value, ty)),
        },
        _ => Err(incompatible(value, ty)),
    }
}

fn bind_i64(value: &UniversalValue, ty: &Type) -> Result<Option<i64>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Bool(b) => Ok(Some(i64::from(*b))),
        UniversalValue::Decimal(s) | UniversalValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| incompatible(value, ty)),
        other => other.as_i64().map(Some).ok_or_else(|| incompatible(value, ty)),
    }
}

fn bind_f64(value: &UniversalValue, ty: &Type) -> Result<Option<f64>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Float32(f) => Ok(Some(f64::from(*f))),
        UniversalValue::Float64(f) => Ok(Some(*f)),
        UniversalValue::Decimal(s) | UniversalValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| incompatible(value, ty)),
        other => other
            .as_i64()
            .map(|i| Some(i as f64))
            .ok_or_else(|| incompatible(value, ty)),
    }
}

fn bind_decimal(value: &UniversalValue, ty: &Type) -> Result<Option<Decimal>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Decimal(s) | UniversalValue::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map(Some)
            .map_err(|_| incompatible(value, ty)),
        UniversalValue::Float32(f) => Decimal::try_from(*f)
            .map(Some)
            .map_err(|_| out_of_range(f, ty)),
        UniversalValue::Float64(f) => Decimal::try_from(*f)
            .map(Some)
            .map_err(|_| out_of_range(f, ty)),
        other => other
            .as_i64()
            .map(|i| Some(Decimal::from(i)))
            .ok_or_else(|| incompatible(value, ty)),
    }
}

fn bind_utc(value: &UniversalValue, ty: &Type) -> Result<Option<DateTime<Utc>>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                parse_naive_timestamp(s)
                    .map(|ts| DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc))
            })
            .map(Some)
            .map_err(|_| incompatible(value, ty)),
        other => other.as_utc().map(Some).ok_or_else(|| incompatible(value, ty)),
    }
}

fn parse_naive_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn bind_naive(value: &UniversalValue, ty: &Type) -> Result<Option<NaiveDateTime>, ValueError> {
    match value {
        UniversalValue::Timestamp(ts) => Ok(Some(*ts)),
        other => Ok(bind_utc(other, ty)?.map(|dt| dt.naive_utc())),
    }
}

fn bind_date(value: &UniversalValue, ty: &Type) -> Result<Option<NaiveDate>, ValueError> {
    match value {
        UniversalValue::Date(d) => Ok(Some(*d)),
        UniversalValue::String(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(d) => Ok(Some(d)),
            Err(_) => Ok(bind_naive(value, ty)?.map(|ts| ts.date())),
        },
        other => Ok(bind_naive(other, ty)?.map(|ts| ts.date())),
    }
}

fn bind_time(value: &UniversalValue, ty: &Type) -> Result<Option<NaiveTime>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::String(s) => NaiveTime::from_str(s.trim())
            .map(Some)
            .map_err(|_| incompatible(value, ty)),
        UniversalValue::Timestamp(ts) => Ok(Some(ts.time())),
        UniversalValue::TimestampTz(dt) => Ok(Some(dt.time())),
        _ => Err(incompatible(value, ty)),
    }
}

fn bind_uuid(value: &UniversalValue, ty: &Type) -> Result<Option<uuid::Uuid>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Uuid(u) => Ok(Some(*u)),
        UniversalValue::String(s) => uuid::Uuid::parse_str(s.trim())
            .map(Some)
            .map_err(|_| incompatible(value, ty)),
        _ => Err(incompatible(value, ty)),
    }
}

fn bind_json(value: &UniversalValue) -> Option<serde_json::Value> {
    match value {
        UniversalValue::Null => None,
        UniversalValue::Json(json) => Some(json.clone()),
        other => Some(other.to_canonical_json()),
    }
}

fn bind_bytes(value: &UniversalValue, ty: &Type) -> Result<Option<Vec<u8>>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Bytes(b) => Ok(Some(b.clone())),
        UniversalValue::String(s) => Ok(Some(s.as_bytes().to_vec())),
        _ => Err(incompatible(value, ty)),
    }
}

fn bind_text(value: &UniversalValue) -> Option<String> {
    match value {
        UniversalValue::Null => None,
        other => Some(other.to_text()),
    }
}

fn bind_array<T>(
    value: &UniversalValue,
    ty: &Type,
    element: impl Fn(&UniversalValue, &Type) -> Result<Option<T>, ValueError>,
) -> Result<Option<Vec<Option<T>>>, ValueError> {
    match value {
        UniversalValue::Null => Ok(None),
        UniversalValue::Array(items) => items
            .iter()
            .map(|item| element(item, ty))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        UniversalValue::Json(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| element(&json_scalar(item), ty))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        _ => Err(incompatible(value, ty)),
    }
}

fn json_scalar(value: &serde_json::Value) -> UniversalValue {
    match value {
        serde_json::Value::Null => UniversalValue::Null,
        serde_json::Value::Bool(b) => UniversalValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => UniversalValue::Int64(i),
            None => UniversalValue::Float64(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => UniversalValue::String(s.clone()),
        other => UniversalValue::Json(other.clone()),
    }
}

/// Convert `value` into a parameter accepted by a `ty` placeholder.
pub fn to_sql_param(value: &UniversalValue, ty: &Type) -> Result<SqlParam, ValueError> {
    let boxed = match *ty {
        Type::BOOL => param(bind_bool(value, ty)?),
        Type::INT2 => param(
            bind_i64(value, ty)?
                .map(|i| i16::try_from(i).map_err(|_| out_of_range(i, ty)))
                .transpose()?,
        ),
        Type::INT4 => param(
            bind_i64(value, ty)?
                .map(|i| i32::try_from(i).map_err(|_| out_of_range(i, ty)))
                .transpose()?,
        ),
        Type::INT8 => param(bind_i64(value, ty)?),
        Type::FLOAT4 => param(bind_f64(value, ty)?.map(|f| f as f32)),
        Type::FLOAT8 => param(bind_f64(value, ty)?),
        Type::NUMERIC => param(bind_decimal(value, ty)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            param(bind_text(value))
        }
        Type::TIMESTAMP => param(bind_naive(value, ty)?),
        Type::TIMESTAMPTZ => param(bind_utc(value, ty)?),
        Type::DATE => param(bind_date(value, ty)?),
        Type::TIME => param(bind_time(value, ty)?),
        Type::UUID => param(bind_uuid(value, ty)?),
        Type::JSON | Type::JSONB => param(bind_json(value)),
        Type::BYTEA => param(bind_bytes(value, ty)?),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            param(bind_array(value, ty, |v, _| Ok(bind_text(v)))?)
        }
        Type::INT4_ARRAY => param(bind_array(value, ty, |v, t| {
            bind_i64(v, t)?
                .map(|i| i32::try_from(i).map_err(|_| out_of_range(i, t)))
                .transpose()
        })?),
        Type::INT8_ARRAY => param(bind_array(value, ty, bind_i64)?),
        Type::FLOAT8_ARRAY => param(bind_array(value, ty, bind_f64)?),
        Type::BOOL_ARRAY => param(bind_array(value, ty, bind_bool)?),
        _ => return Err(ValueError::UnsupportedParameter(ty.to_string())),
    };
    Ok(boxed)
}
