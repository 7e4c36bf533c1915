//! serde helpers for date-time fields stored in loose formats.
//!
//! The row mapper already reads plain `NaiveDateTime` fields from
//! `YYYY-MM-DD[ T]HH:MM:SS[.f]`, bare dates and Unix seconds. These helpers give
//! the same leniency to records that are also read from other sources such as
//! JSON, where chrono alone accepts only ISO-8601 text with a `T` separator. Use
//! `#[serde(with = "simpledb::mapper::datetime")]`, or `datetime::option` for
//! nullable fields.

use super::coerce;
use chrono::{DateTime, NaiveDateTime};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serializer};
use std::fmt;

struct DateTimeVisitor;

impl<'de> Visitor<'de> for DateTimeVisitor {
    type Value = NaiveDateTime;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a date-time string or Unix seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        coerce::parse_datetime(v).ok_or_else(|| E::custom(format!("invalid date-time '{}'", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        DateTime::from_timestamp(v, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| E::custom(format!("timestamp {} out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let v = i64::try_from(v).map_err(|_| E::custom(format!("timestamp {} out of range", v)))?;
        self.visit_i64(v)
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    deserializer.deserialize_any(DateTimeVisitor)
}

pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format(coerce::DATETIME_FORMAT))
}

/// Same as the parent module for `Option<NaiveDateTime>`; NULL maps to `None`.
pub mod option {
    use super::*;

    #[derive(Deserialize)]
    struct Loose(#[serde(deserialize_with = "super::deserialize")] NaiveDateTime);

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        Option::<Loose>::deserialize(deserializer).map(|v| v.map(|Loose(dt)| dt))
    }

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => super::serialize(dt, serializer),
            None => serializer.serialize_none(),
        }
    }
}
