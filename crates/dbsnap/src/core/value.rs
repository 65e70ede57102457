//! SQL value types exchanged with stores.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value;

/// Format used for datetimes written into snapshot documents.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Format used for dates written into snapshot documents.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Owned SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    /// Fixed-point number.
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    /// Structured value (array elements, nested documents).
    Json(Value),
}

/// One row as ordered `(column, value)` pairs.
pub type Row = Vec<(String, SqlValue)>;

impl SqlValue {
    /// Convert to a JSON-safe value for a snapshot document.
    ///
    /// Values with no JSON counterpart are stringified: temporal values in
    /// ISO-8601, decimals as their exact text, bytes as lowercase hex and
    /// non-finite floats by name.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(v) => Value::Bool(*v),
            SqlValue::I64(v) => Value::from(*v),
            SqlValue::F64(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(v.to_string())),
            SqlValue::Decimal(v) => Value::String(v.to_string()),
            SqlValue::Text(v) => Value::String(v.clone()),
            SqlValue::Bytes(v) => Value::String(hex::encode(v)),
            SqlValue::DateTime(v) => Value::String(v.format(DATETIME_FORMAT).to_string()),
            SqlValue::Date(v) => Value::String(v.format(DATE_FORMAT).to_string()),
            SqlValue::Json(v) => v.clone(),
        }
    }

    /// Convert a document value into a native value without type knowledge.
    pub fn from_json(value: &Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(v) => SqlValue::Bool(*v),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::I64(i),
                None => SqlValue::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_temporal_values_are_iso_strings() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 5, 250_000)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).to_json(),
            json!("2024-03-01T12:30:05.250")
        );
        let whole = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(SqlValue::DateTime(whole).to_json(), json!("2024-03-01T08:00:00"));
        assert_eq!(
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).to_json(),
            json!("2024-03-01")
        );
    }

    #[test]
    fn test_non_json_values_are_stringified() {
        assert_eq!(
            SqlValue::Decimal(Decimal::from_str("12.50").unwrap()).to_json(),
            json!("12.50")
        );
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_json(), json!("dead"));
        assert_eq!(SqlValue::F64(f64::INFINITY).to_json(), json!("inf"));
        assert_eq!(SqlValue::F64(1.5).to_json(), json!(1.5));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(SqlValue::from_json(&json!(7)), SqlValue::I64(7));
        assert_eq!(SqlValue::from_json(&json!(2.5)), SqlValue::F64(2.5));
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from_json(&json!([1, 2])),
            SqlValue::Json(json!([1, 2]))
        );
    }
}
