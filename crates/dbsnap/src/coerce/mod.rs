//! Value coercion from snapshot documents into native values.
//!
//! Only `DateTime` and `Date` columns are repaired: their textual values are
//! parsed as ISO-8601 first, then against an ordered list of fallback
//! formats, first match wins. Text that matches nothing becomes NULL and is
//! reported, never replaced by a guessed value. Every other column passes
//! through unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::codec::LogicalType;
use crate::core::value::SqlValue;

/// Fallback datetime formats tried after ISO-8601, in order.
pub const DATETIME_FALLBACKS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S",
];

/// Date formats, in order.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

const ISO_NAIVE: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Outcome of coercing one document value.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// Value to insert.
    Value(SqlValue),
    /// Unparseable temporal text; NULL is inserted instead.
    Nulled(String),
}

impl Coerced {
    pub fn into_value(self) -> SqlValue {
        match self {
            Coerced::Value(v) => v,
            Coerced::Nulled(_) => SqlValue::Null,
        }
    }
}

/// Parses temporal text with a configurable list of fallback formats.
#[derive(Debug, Clone)]
pub struct ValueCoercer {
    datetime_formats: Vec<String>,
    date_formats: Vec<String>,
}

impl Default for ValueCoercer {
    fn default() -> Self {
        Self {
            datetime_formats: DATETIME_FALLBACKS.iter().map(|f| f.to_string()).collect(),
            date_formats: DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl ValueCoercer {
    /// Append extra datetime formats after the built-in fallbacks.
    pub fn with_datetime_formats(mut self, formats: &[String]) -> Self {
        self.datetime_formats.extend(formats.iter().cloned());
        self
    }

    /// Coerce a document value for a column of type `ty`.
    pub fn coerce(&self, ty: &LogicalType, value: &Value) -> Coerced {
        match (ty, value) {
            (_, Value::Null) => Coerced::Value(SqlValue::Null),
            (LogicalType::DateTime, Value::String(s)) => match self.parse_datetime(s) {
                Some(dt) => Coerced::Value(SqlValue::DateTime(dt)),
                None => Coerced::Nulled(s.clone()),
            },
            (LogicalType::Date, Value::String(s)) => match self.parse_date(s) {
                Some(d) => Coerced::Value(SqlValue::Date(d)),
                None => Coerced::Nulled(s.clone()),
            },
            (LogicalType::DateTime | LogicalType::Date, other) => Coerced::Nulled(other.to_string()),
            (_, other) => Coerced::Value(SqlValue::from_json(other)),
        }
    }

    /// Parse datetime text. Offsets are normalized to UTC; a bare date
    /// means midnight.
    pub fn parse_datetime(&self, text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, ISO_NAIVE) {
            return Some(dt);
        }
        self.datetime_formats
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
            .or_else(|| {
                self.parse_date_only(text)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }

    /// Parse date text. Datetime text keeps only its date, as written
    /// in its own offset.
    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.naive_local().date());
        }
        self.parse_date_only(text)
            .or_else(|| self.parse_datetime(text).map(|dt| dt.date()))
    }

    fn parse_date_only(&self, text: &str) -> Option<NaiveDate> {
        self.date_formats
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
    }
}
