//! Raw storage values to typed JSON values.
//!
//! Coercion is total: values of unknown type pass through untouched and
//! `null` stays `null`.

use base64::prelude::*;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use crate::schema::TableSchema;
use relgraph_state::Row;

/// Datetime rendering used for `DATE`/`DATETIME` columns.
pub const DATETIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

const ZERO_DATETIME: &str = "0000-00-00 00:00:00";
const ZERO_DATE: &str = "0000-00-00";

/// Storage type families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Float,
    Blob,
    DateTime,
    Text,
    Other,
}

impl TypeFamily {
    /// Classify a storage type name, ignoring case and any size suffix
    /// (`VARCHAR(255)`, `int unsigned`).
    pub fn of(storage_type: &str) -> Self {
        let base = storage_type
            .trim()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match base.as_str() {
            "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" | "long"
            | "year" => TypeFamily::Integer,
            "float" | "double" | "decimal" | "real" | "numeric" => TypeFamily::Float,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                TypeFamily::Blob
            }
            "date" | "datetime" | "timestamp" => TypeFamily::DateTime,
            "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" => {
                TypeFamily::Text
            }
            _ => TypeFamily::Other,
        }
    }

    /// Columns the entry search matches against.
    pub fn is_searchable(self) -> bool {
        matches!(self, TypeFamily::Integer | TypeFamily::Text)
    }
}

/// Coerce one raw value according to its column's storage type.
pub fn coerce(raw: Value, storage_type: &str) -> Value {
    if raw.is_null() {
        return raw;
    }
    match TypeFamily::of(storage_type) {
        TypeFamily::Integer => to_integer(raw),
        TypeFamily::Float => to_float(raw),
        TypeFamily::Blob => to_base64(raw),
        TypeFamily::DateTime => to_datetime(raw),
        TypeFamily::Text | TypeFamily::Other => raw,
    }
}

/// Coerce every column of a row that the schema knows about.
pub fn coerce_row(schema: &TableSchema, mut row: Row) -> Row {
    for column in schema.non_alias_columns() {
        if let Some(value) = row.get_mut(&column.id) {
            *value = coerce(value.take(), &column.storage_type);
        }
    }
    row
}

fn leading_integer(text: &str) -> i64 {
    let text = text.trim_start();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

fn to_integer(raw: Value) -> Value {
    let n = match &raw {
        Value::Number(n) if n.as_i64().is_some() => None,
        Value::Number(n) => Some(n.as_f64().map(|f| f.trunc() as i64).unwrap_or(0)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => Some(leading_integer(s)),
        _ => None,
    };
    n.map(Value::from).unwrap_or(raw)
}

fn to_float(raw: Value) -> Value {
    let f = match &raw {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::String(s) => Some(s.trim().parse::<f64>().unwrap_or(0.0)),
        _ => None,
    };
    f.and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(raw)
}

fn to_base64(raw: Value) -> Value {
    match raw {
        Value::String(s) => Value::String(BASE64_STANDARD.encode(s.as_bytes())),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect();
            match bytes {
                Some(bytes) => Value::String(BASE64_STANDARD.encode(bytes)),
                None => Value::Array(items),
            }
        }
        other => other,
    }
}

fn to_datetime(raw: Value) -> Value {
    let Value::String(text) = &raw else {
        return raw;
    };
    let text = text.trim();
    if text.is_empty() || text == ZERO_DATETIME || text == ZERO_DATE {
        return Value::Null;
    }
    let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    match parsed {
        Some(at) => Value::String(at.format(DATETIME_FORMAT).to_string()),
        None => raw,
    }
}
