//! Conversion of SQL Server column values to JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, FromSql, Row};

use crate::session::JsonRow;

/// Decimals with fewer significant digits than this survive an `f64`.
const EXACT_DECIMAL_LIMIT: u128 = 1_000_000_000_000_000;

/// Converts a row into a JSON object keyed by column name.
pub(crate) fn row_to_json(row: Row) -> JsonRow {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| (name, column_to_json(&data)))
        .collect()
}

pub(crate) fn column_to_json(data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(value) => value.map_or(Value::Null, Value::from),
        ColumnData::I16(value) => value.map_or(Value::Null, Value::from),
        ColumnData::I32(value) => value.map_or(Value::Null, Value::from),
        ColumnData::I64(value) => value.map_or(Value::Null, Value::from),
        ColumnData::F32(value) => value.map_or(Value::Null, |v| Value::from(f64::from(v))),
        ColumnData::F64(value) => value.map_or(Value::Null, Value::from),
        ColumnData::Bit(value) => value.map_or(Value::Null, Value::Bool),
        ColumnData::String(value) => value
            .as_ref()
            .map_or(Value::Null, |text| Value::String(text.to_string())),
        ColumnData::Guid(value) => value.map_or(Value::Null, |guid| Value::String(guid.to_string())),
        ColumnData::Binary(value) => value
            .as_ref()
            .map_or(Value::Null, |bytes| Value::String(BASE64.encode(bytes))),
        ColumnData::Numeric(value) => value.as_ref().map_or(Value::Null, numeric_to_json),
        ColumnData::Xml(value) => value
            .as_ref()
            .map_or(Value::Null, |xml| Value::String(xml.to_string())),
        temporal => temporal_to_json(temporal),
    }
}

/// Decimals become JSON numbers when that is lossless, strings otherwise.
fn numeric_to_json(numeric: &Numeric) -> Value {
    let text = decimal_text(numeric.value(), numeric.scale());
    let exact = numeric.value().unsigned_abs() < EXACT_DECIMAL_LIMIT;
    match text.parse::<f64>() {
        Ok(number) if exact => Value::from(number),
        _ => Value::String(text),
    }
}

fn decimal_text(value: i128, scale: u8) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let scale = usize::from(scale);
    let digits = format!("{:0>width$}", value.unsigned_abs(), width = scale + 1);
    let (int_part, fraction) = digits.split_at(digits.len() - scale);
    if fraction.is_empty() {
        format!("{sign}{int_part}")
    } else {
        format!("{sign}{int_part}.{fraction}")
    }
}

/// Date and time columns render as ISO-8601 strings.
fn temporal_to_json(data: &ColumnData<'static>) -> Value {
    if let Ok(Some(value)) = DateTime::<FixedOffset>::from_sql(data) {
        return Value::String(value.to_rfc3339());
    }
    if let Ok(Some(value)) = NaiveDateTime::from_sql(data) {
        return Value::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(value)) = NaiveDate::from_sql(data) {
        return Value::String(value.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(value)) = NaiveTime::from_sql(data) {
        return Value::String(value.format("%H:%M:%S%.f").to_string());
    }
    Value::Null
}
