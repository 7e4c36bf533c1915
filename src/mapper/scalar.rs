//! Single-value reads.

use super::coerce;
use super::de::DecodeError;
use crate::models::SqlValue;
use chrono::{NaiveDate, NaiveDateTime};

/// A Rust type readable from one non-NULL column value.
pub trait Scalar: Sized {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError>;
}

impl Scalar for i64 {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_i64(value).map_err(DecodeError::new)
    }
}

impl Scalar for i32 {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        let wide = i64::from_sql(value)?;
        i32::try_from(wide)
            .map_err(|_| DecodeError::new(format!("value {} out of range for i32", wide)))
    }
}

impl Scalar for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_f64(value).map_err(DecodeError::new)
    }
}

impl Scalar for bool {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_bool(value).map_err(DecodeError::new)
    }
}

impl Scalar for String {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_string(value).map_err(DecodeError::new)
    }
}

impl Scalar for NaiveDateTime {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_datetime(value).map_err(DecodeError::new)
    }
}

impl Scalar for NaiveDate {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_date(value).map_err(DecodeError::new)
    }
}

impl Scalar for Vec<u8> {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        coerce::to_bytes(value).map_err(DecodeError::new)
    }
}

impl Scalar for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, DecodeError> {
        Ok(value.clone())
    }
}
