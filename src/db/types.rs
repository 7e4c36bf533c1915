//! Database-agnostic type mappings.
//!
//! This module provides utilities for mapping between database-specific types
//! and `SqlValue`.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies declared column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQLite is dynamically typed, so its decoder looks at the storage class of each
//! value first and only uses the declared type to recognize booleans and
//! date-times.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, RawRow, SqlValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Timestamp,
    Uuid,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }

    // Boolean (MySQL reports TINYINT(1) as BOOLEAN)
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // Date/time types that carry a date
    if lower.starts_with("timestamp") || lower == "datetime" || lower == "date" {
        return TypeCategory::Timestamp;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Binary types; MySQL BIT(n) arrives as raw bytes
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" || lower == "bit" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => pg_numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

/// Render the binary NUMERIC wire format (base-10000 digits) as decimal text.
fn pg_numeric_to_string(buf: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let read_i16 = |at: usize| i16::from_be_bytes([buf[at], buf[at + 1]]);
    let read_u16 = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);

    if buf.len() < 8 {
        return Err("NUMERIC value too short".into());
    }
    let ndigits = read_i16(0).max(0) as usize;
    let weight = i32::from(read_i16(2));
    let sign = read_u16(4);
    let dscale = read_u16(6) as usize;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }
    if buf.len() < 8 + ndigits * 2 {
        return Err("NUMERIC value truncated".into());
    }
    let digits: Vec<i16> = (0..ndigits).map(|i| read_i16(8 + i * 2)).collect();
    let digit_at = |idx: i32| -> i16 {
        if idx < 0 {
            0
        } else {
            digits.get(idx as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == 0x4000 && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }
    if weight >= 0 {
        for idx in 0..=weight {
            if idx == 0 {
                out.push_str(&digit_at(idx).to_string());
            } else {
                out.push_str(&format!("{:04}", digit_at(idx)));
            }
        }
    } else {
        out.push('0');
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(idx)));
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

// =============================================================================
// Row to RawRow Trait
// =============================================================================

/// Trait for converting database rows to `RawRow`s.
///
/// Column labels are read once per result set with `column_labels` and passed
/// to `to_raw_row` for every row.
pub trait RowToRaw: Row {
    fn column_labels(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }

    fn decode_value(&self, idx: usize) -> DbResult<SqlValue>;

    fn to_raw_row(&self, labels: &[String]) -> DbResult<RawRow> {
        let mut row = RawRow::with_capacity(labels.len());
        for (idx, label) in labels.iter().enumerate() {
            let value = self.decode_value(idx).map_err(|e| match e {
                DbError::Mapping { message, .. } => DbError::mapping(Some(label.as_str()), message),
                other => other,
            })?;
            row.insert(label.clone(), value);
        }
        Ok(row)
    }
}

impl RowToRaw for MySqlRow {
    fn decode_value(&self, idx: usize) -> DbResult<SqlValue> {
        let type_name = self.columns()[idx].type_info().name();
        let category = categorize_type(type_name, DatabaseType::MySQL);
        mysql::decode_column(self, idx, type_name, category)
    }
}

impl RowToRaw for PgRow {
    fn decode_value(&self, idx: usize) -> DbResult<SqlValue> {
        let type_name = self.columns()[idx].type_info().name();
        let category = categorize_type(type_name, DatabaseType::PostgreSQL);
        postgres::decode_column(self, idx, type_name, category)
    }
}

impl RowToRaw for SqliteRow {
    fn decode_value(&self, idx: usize) -> DbResult<SqlValue> {
        let type_name = self.columns()[idx].type_info().name();
        let category = categorize_type(type_name, DatabaseType::SQLite);
        sqlite::decode_column(self, idx, category)
    }
}

fn unsupported(type_name: &str) -> DbError {
    DbError::mapping(None, format!("unsupported column type {}", type_name))
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DbResult<SqlValue> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(SqlValue::Null);
        }
        match category {
            TypeCategory::Decimal => Ok(SqlValue::Text(row.try_get::<RawDecimal, _>(idx)?.0)),
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx, type_name),
            TypeCategory::Binary => decode_binary(row, idx, type_name),
            TypeCategory::Timestamp => decode_timestamp(row, idx, type_name),
            TypeCategory::Json => decode_json(row, idx),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            // BIGINT UNSIGNED above i64::MAX keeps its exact digits
            return Ok(i64::try_from(v)
                .map(SqlValue::Int)
                .unwrap_or_else(|_| SqlValue::Text(v.to_string())));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        Err(unsupported(type_name))
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Ok(SqlValue::Bool(v));
        }
        Ok(SqlValue::Int(row.try_get::<i8, _>(idx)?.into()))
    }

    fn decode_float(row: &MySqlRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(SqlValue::Float(v));
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Ok(SqlValue::Float(v.into()));
        }
        Err(unsupported(type_name))
    }

    fn decode_binary(row: &MySqlRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Ok(SqlValue::Bytes(v));
        }
        // BIT(n) may be reported as an unsigned integer
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Ok(SqlValue::Int(v as i64));
        }
        Err(unsupported(type_name))
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Ok(SqlValue::DateTime(v));
        }
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Ok(SqlValue::DateTime(v.naive_utc()));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Ok(v.into());
        }
        decode_text(row, idx, type_name)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        match row.try_get::<serde_json::Value, _>(idx) {
            Ok(v) => Ok(SqlValue::Text(v.to_string())),
            Err(_) => Ok(SqlValue::Text(row.try_get::<String, _>(idx)?)),
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(SqlValue::Text(v));
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return Ok(SqlValue::Text(v.to_string()));
        }
        // YEAR and friends come back as integers in the binary protocol
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Ok(SqlValue::Text(String::from_utf8_lossy(&v).into_owned()));
        }
        Err(unsupported(type_name))
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DbResult<SqlValue> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(SqlValue::Null);
        }
        match category {
            TypeCategory::Decimal => Ok(SqlValue::Text(row.try_get::<RawDecimal, _>(idx)?.0)),
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Boolean => Ok(SqlValue::Bool(row.try_get::<bool, _>(idx)?)),
            TypeCategory::Float => decode_float(row, idx, type_name),
            TypeCategory::Binary => Ok(SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            TypeCategory::Json => {
                Ok(SqlValue::Text(row.try_get::<serde_json::Value, _>(idx)?.to_string()))
            }
            TypeCategory::Uuid => Ok(SqlValue::Text(
                row.try_get::<uuid::Uuid, _>(idx)?.hyphenated().to_string(),
            )),
            TypeCategory::Timestamp => decode_timestamp(row, idx, type_name),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        Err(unsupported(type_name))
    }

    fn decode_float(row: &PgRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(SqlValue::Float(v));
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Ok(SqlValue::Float(v.into()));
        }
        Err(unsupported(type_name))
    }

    fn decode_timestamp(row: &PgRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Ok(SqlValue::DateTime(v));
        }
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Ok(SqlValue::DateTime(v.naive_utc()));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Ok(v.into());
        }
        Err(unsupported(type_name))
    }

    fn decode_text(row: &PgRow, idx: usize, type_name: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(SqlValue::Text(v));
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return Ok(SqlValue::Text(v.to_string()));
        }
        Err(unsupported(type_name))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        category: TypeCategory,
    ) -> DbResult<SqlValue> {
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(SqlValue::Null);
            }
            raw.type_info().name().to_string()
        };

        match (storage.as_str(), category) {
            ("INTEGER", TypeCategory::Boolean) => Ok(SqlValue::Bool(row.try_get::<bool, _>(idx)?)),
            ("INTEGER", _) => Ok(SqlValue::Int(row.try_get::<i64, _>(idx)?)),
            ("REAL", _) => Ok(SqlValue::Float(row.try_get::<f64, _>(idx)?)),
            ("TEXT", TypeCategory::Timestamp) => match row.try_get::<NaiveDateTime, _>(idx) {
                Ok(v) => Ok(SqlValue::DateTime(v)),
                Err(_) => Ok(SqlValue::Text(row.try_get::<String, _>(idx)?)),
            },
            ("TEXT", _) => Ok(SqlValue::Text(row.try_get::<String, _>(idx)?)),
            ("BLOB", _) => Ok(SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            (other, _) => decode_fallback(row, idx, other),
        }
    }

    fn decode_fallback(row: &SqliteRow, idx: usize, storage: &str) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get_unchecked::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
            return Ok(SqlValue::Text(v));
        }
        Err(unsupported(storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("SERIAL", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_boolean_and_bit() {
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::SQLite),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("BOOL", DatabaseType::PostgreSQL),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("BIT", DatabaseType::MySQL),
            TypeCategory::Binary
        );
    }

    #[test]
    fn test_categorize_type_timestamp() {
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::SQLite),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::MySQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("TIME", DatabaseType::MySQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_json_and_text() {
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("BPCHAR", DatabaseType::PostgreSQL),
            TypeCategory::Text
        );
    }

    fn numeric(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ndigits.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_pg_numeric_to_string() {
        assert_eq!(
            pg_numeric_to_string(&numeric(2, 0, 0, 2, &[123, 4500])).unwrap(),
            "123.45"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(1, -1, 0, 4, &[12])).unwrap(),
            "0.0012"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(1, 1, 0, 0, &[1])).unwrap(),
            "10000"
        );
        assert_eq!(
            pg_numeric_to_string(&numeric(1, 0, 0x4000, 1, &[7])).unwrap(),
            "-7.0"
        );
        assert_eq!(pg_numeric_to_string(&numeric(0, 0, 0, 0, &[])).unwrap(), "0");
        assert_eq!(
            pg_numeric_to_string(&numeric(0, 0, 0xC000, 0, &[])).unwrap(),
            "NaN"
        );
    }

    #[test]
    fn test_pg_numeric_rejects_short_buffer() {
        assert!(pg_numeric_to_string(&[0, 1]).is_err());
        assert!(pg_numeric_to_string(&numeric(3, 0, 0, 0, &[1])).is_err());
    }
}
