//! Conversion of raw rows into scalars and typed records.
//!
//! Records are any `DeserializeOwned` type. Column labels are matched to field
//! names exactly first, then ignoring case and underscores; columns without a
//! matching field are ignored. Fields no column supplies keep their zero value:
//! `None`, `0`, `false`, an empty string or an empty collection, or the field's
//! own `#[serde(default)]`.
//!
//! ```
//! use serde::Deserialize;
//! use simpledb::{RawRow, SqlValue, mapper};
//!
//! #[derive(Deserialize)]
//! struct Article {
//!     id: i64,
//!     title: String,
//!     summary: Option<String>,
//!     views: i64,
//! }
//!
//! let row: RawRow = vec![
//!     ("ID".to_string(), SqlValue::Int(1)),
//!     ("title".to_string(), SqlValue::from("Hello")),
//! ]
//! .into_iter()
//! .collect();
//!
//! let article: Article = mapper::to_record(&row).unwrap();
//! assert_eq!(article.id, 1);
//! assert!(article.summary.is_none());
//! assert_eq!(article.views, 0);
//! ```

mod coerce;
pub mod datetime;
mod de;
mod scalar;

pub use de::{DecodeError, RowDeserializer, ValueDeserializer};
pub use scalar::Scalar;

use crate::error::{DbError, DbResult};
use crate::models::RawRow;
use serde::de::DeserializeOwned;

/// Map one row onto `T`.
pub fn to_record<T: DeserializeOwned>(row: &RawRow) -> DbResult<T> {
    Ok(de::deserialize_row(row, &mut Vec::new())?)
}

/// Map every row onto `T`, failing on the first row that does not fit.
pub fn to_records<T: DeserializeOwned>(rows: &[RawRow]) -> DbResult<Vec<T>> {
    let mut zeroed = Vec::new();
    rows.iter()
        .map(|row| de::deserialize_row(row, &mut zeroed).map_err(DbError::from))
        .collect()
}

/// Read column 1 of `row`; `None` when there is no row or the value is NULL.
pub fn to_scalar<T: Scalar>(row: Option<&RawRow>) -> DbResult<Option<T>> {
    let Some((column, value)) = row.and_then(RawRow::first) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    T::from_sql(value)
        .map(Some)
        .map_err(|e| DbError::from(e.at(column)))
}

/// Read column 1 of every row, skipping NULLs.
pub fn to_scalars<T: Scalar>(rows: &[RawRow]) -> DbResult<Vec<T>> {
    rows.iter()
        .filter_map(|row| to_scalar(Some(row)).transpose())
        .collect()
}
