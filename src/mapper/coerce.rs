//! Value coercions shared by record and scalar mapping.
//!
//! Each function converts one non-NULL `SqlValue` into the requested Rust type
//! or returns a message describing why it cannot.

use crate::models::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Rendering used whenever a date-time is mapped to text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const DATETIME_INPUT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn mismatch(value: &SqlValue, target: &str) -> String {
    format!("cannot convert {} {} to {}", value.type_name(), value, target)
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Booleans accept numbers (nonzero is true), single-bit byte values and the
/// usual textual spellings.
pub fn to_bool(value: &SqlValue) -> Result<bool, String> {
    match value {
        SqlValue::Bool(v) => Ok(*v),
        SqlValue::Int(v) => Ok(*v != 0),
        SqlValue::Float(v) => Ok(*v != 0.0),
        // BIT(1) arrives as a single byte; an empty value reads as false
        SqlValue::Bytes(v) => Ok(v.first().is_some_and(|b| *b != 0)),
        SqlValue::Text(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Ok(true),
            "false" | "f" | "0" | "no" | "n" => Ok(false),
            _ => Err(mismatch(value, "bool")),
        },
        _ => Err(mismatch(value, "bool")),
    }
}

pub fn to_i64(value: &SqlValue) -> Result<i64, String> {
    match value {
        SqlValue::Int(v) => Ok(*v),
        SqlValue::Bool(v) => Ok(i64::from(*v)),
        SqlValue::Float(v) => integral(*v).ok_or_else(|| mismatch(value, "integer")),
        SqlValue::Text(v) => {
            let v = v.trim();
            v.parse::<i64>()
                .ok()
                .or_else(|| v.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| mismatch(value, "integer"))
        }
        // BIT(n) values, big-endian
        SqlValue::Bytes(v) if !v.is_empty() && v.len() <= 8 => {
            Ok(v.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)) as i64)
        }
        _ => Err(mismatch(value, "integer")),
    }
}

fn integral(v: f64) -> Option<i64> {
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

pub fn to_f64(value: &SqlValue) -> Result<f64, String> {
    match value {
        SqlValue::Float(v) => Ok(*v),
        SqlValue::Int(v) => Ok(*v as f64),
        SqlValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
        SqlValue::Text(v) => v.trim().parse().map_err(|_| mismatch(value, "float")),
        _ => Err(mismatch(value, "float")),
    }
}

pub fn to_string(value: &SqlValue) -> Result<String, String> {
    match value {
        SqlValue::Text(v) => Ok(v.clone()),
        SqlValue::Int(v) => Ok(v.to_string()),
        SqlValue::Float(v) => Ok(v.to_string()),
        SqlValue::Bool(v) => Ok(v.to_string()),
        SqlValue::DateTime(v) => Ok(format_datetime(v)),
        SqlValue::Bytes(v) => {
            String::from_utf8(v.clone()).map_err(|_| "binary value is not valid UTF-8".to_string())
        }
        SqlValue::Null => Err(mismatch(value, "string")),
    }
}

pub fn to_bytes(value: &SqlValue) -> Result<Vec<u8>, String> {
    match value {
        SqlValue::Bytes(v) => Ok(v.clone()),
        SqlValue::Text(v) => Ok(v.clone().into_bytes()),
        _ => Err(mismatch(value, "bytes")),
    }
}

/// Parse `YYYY-MM-DD[ T]HH:MM:SS[.f]`, RFC 3339 or a bare `YYYY-MM-DD`.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Date-times accept native values, text and Unix seconds.
pub fn to_datetime(value: &SqlValue) -> Result<NaiveDateTime, String> {
    match value {
        SqlValue::DateTime(v) => Ok(*v),
        SqlValue::Text(v) => parse_datetime(v).ok_or_else(|| mismatch(value, "date-time")),
        SqlValue::Int(v) => DateTime::from_timestamp(*v, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| mismatch(value, "date-time")),
        _ => Err(mismatch(value, "date-time")),
    }
}

pub fn to_date(value: &SqlValue) -> Result<NaiveDate, String> {
    to_datetime(value)
        .map(|dt| dt.date())
        .map_err(|_| mismatch(value, "date"))
}
