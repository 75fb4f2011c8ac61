/// Scalar Value Module
///
/// Conversions from raw SQLite values into the scalar kinds the facade
/// hands back: raw value, string, 32-bit integer, decimal, date-time, GUID
/// and boolean. Scalar conversion goes through the textual form of the raw
/// value, so `"42"` stored as text converts to `42_i32` just as an integer
/// column would.
use crate::core::{CdbError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rusqlite::types::Value;
use std::str::FromStr;
use uuid::Uuid;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Renders a raw value as text.
///
/// Returns `None` for SQL NULL. Blobs are rendered as `0x`-prefixed hex.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(t) => Some(t.clone()),
        Value::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
            Some(format!("0x{}", hex))
        }
    }
}

/// Name of the storage class of a raw value, for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Integer(_) => "INTEGER",
        Value::Real(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Blob(_) => "BLOB",
    }
}

/// The date-time default output: `0001-01-01 00:00:00`.
pub fn min_date_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Parses date-time text in the common SQL and ISO-8601 layouts.
///
/// A bare date resolves to midnight; an offset timestamp is converted to its
/// naive UTC value.
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// A type a scalar query result can be converted into.
pub trait FromScalar: Sized {
    /// Name used in conversion error messages
    const TARGET: &'static str;

    /// Output handed back when the query fails or yields no value
    fn default_output() -> Self;

    /// Converts a non-NULL raw value
    fn from_scalar(value: &Value) -> Result<Self>;
}

fn conversion_error(text: &str, target: &'static str) -> CdbError {
    CdbError::Conversion {
        value: text.to_string(),
        target,
    }
}

fn scalar_text(value: &Value) -> Result<String> {
    display_value(value).ok_or(CdbError::NoValue)
}

impl FromScalar for Value {
    const TARGET: &'static str = "value";

    fn default_output() -> Self {
        Value::Null
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromScalar for String {
    const TARGET: &'static str = "string";

    fn default_output() -> Self {
        String::new()
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        scalar_text(value)
    }
}

impl FromScalar for i32 {
    const TARGET: &'static str = "i32";

    fn default_output() -> Self {
        0
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        let text = scalar_text(value)?;
        text.trim()
            .parse::<i32>()
            .map_err(|_| conversion_error(&text, Self::TARGET))
    }
}

impl FromScalar for Decimal {
    const TARGET: &'static str = "decimal";

    fn default_output() -> Self {
        Decimal::ZERO
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        let text = scalar_text(value)?;
        Decimal::from_str(text.trim())
            .or_else(|_| Decimal::from_scientific(text.trim()))
            .map_err(|_| conversion_error(&text, Self::TARGET))
    }
}

impl FromScalar for NaiveDateTime {
    const TARGET: &'static str = "date-time";

    fn default_output() -> Self {
        min_date_time()
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        let text = scalar_text(value)?;
        parse_date_time(&text).ok_or_else(|| conversion_error(&text, Self::TARGET))
    }
}

impl FromScalar for Uuid {
    const TARGET: &'static str = "guid";

    fn default_output() -> Self {
        Uuid::nil()
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        if let Value::Blob(bytes) = value {
            if let Ok(uuid) = Uuid::from_slice(bytes) {
                return Ok(uuid);
            }
        }
        let text = scalar_text(value)?;
        Uuid::parse_str(text.trim()).map_err(|_| conversion_error(&text, Self::TARGET))
    }
}

/// Derived from the `i32` conversion: exactly `1` is `true`, any other
/// integer is `false`.
impl FromScalar for bool {
    const TARGET: &'static str = "bool";

    fn default_output() -> Self {
        false
    }

    fn from_scalar(value: &Value) -> Result<Self> {
        i32::from_scalar(value).map(|i| i == 1)
    }
}
