//! serde `Deserializer` implementations over raw rows.
//!
//! A row deserializes as a map (structs, `HashMap`, `serde_json::Value`) or as a
//! sequence of column values in driver order (tuples). Each value goes through
//! [`ValueDeserializer`], which coerces it to whatever type the target asks for.
//!
//! Struct fields that no column supplies take their type's zero value (`0`,
//! `false`, `""`, `None`, empty collections). The derive reports such fields
//! through `missing_field`; [`deserialize_row`] then retries with a zero for each
//! reported field, so `#[serde(default)]` fields keep their own defaults.

use super::coerce;
use crate::error::DbError;
use crate::models::{RawRow, SqlValue};
use serde::de::value::{MapDeserializer, SeqDeserializer, StrDeserializer, U32Deserializer};
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::forward_to_deserialize_any;
use std::fmt;
use thiserror::Error;

/// A failed conversion, optionally tied to the column it came from.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DecodeError {
    column: Option<String>,
    message: String,
    /// Struct field the row did not supply.
    missing: Option<&'static str>,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            column: None,
            message: message.into(),
            missing: None,
        }
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Attach a column label unless one is already set.
    ///
    /// A failure inside a column value never counts as a missing row field.
    pub fn at(mut self, column: &str) -> Self {
        if self.column.is_none() {
            self.column = Some(column.to_string());
        }
        self.missing = None;
        self
    }
}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::new(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        Self {
            missing: Some(field),
            ..Self::new(format!("missing field `{}`", field))
        }
    }
}

/// Deserialize `row` into `T`, zero-filling struct fields the row lacks.
///
/// `zeroed` collects the zero-filled fields; passing the same list for every row
/// of one result skips the retries after the first row.
pub(crate) fn deserialize_row<T: de::DeserializeOwned>(
    row: &RawRow,
    zeroed: &mut Vec<&'static str>,
) -> Result<T, DecodeError> {
    loop {
        match T::deserialize(RowDeserializer::with_zeroed(row, zeroed.as_slice())) {
            Err(DecodeError {
                missing: Some(field),
                ..
            }) if !zeroed.contains(&field) => zeroed.push(field),
            result => return result,
        }
    }
}

impl From<DecodeError> for DbError {
    fn from(err: DecodeError) -> Self {
        DbError::mapping(err.column.as_deref(), err.message)
    }
}

/// Whether a column label names a field: exact, case-insensitive, or equal once
/// underscores are ignored (`CreatedAt` matches `created_at`).
fn same_name(field: &str, column: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    field.eq_ignore_ascii_case(column) || normalize(field) == normalize(column)
}

fn resolve_key<'a>(column: &'a str, fields: &'static [&'static str]) -> &'a str {
    if fields.is_empty() || fields.iter().any(|field| *field == column) {
        return column;
    }
    fields
        .iter()
        .copied()
        .find(|field| same_name(field, column))
        .unwrap_or(column)
}

/// Deserializer for a whole row.
#[derive(Clone, Copy)]
pub struct RowDeserializer<'a> {
    row: &'a RawRow,
    zeroed: &'a [&'static str],
}

impl<'a> RowDeserializer<'a> {
    pub fn new(row: &'a RawRow) -> Self {
        Self { row, zeroed: &[] }
    }

    /// Also yield a zero value under each of `zeroed` that no column resolves to.
    pub fn with_zeroed(row: &'a RawRow, zeroed: &'a [&'static str]) -> Self {
        Self { row, zeroed }
    }

    fn single_column(self) -> Result<ValueDeserializer<'a>, DecodeError> {
        match self.row.first() {
            Some((column, value)) if self.row.len() == 1 => Ok(ValueDeserializer::new(column, value)),
            _ => Err(DecodeError::new(format!(
                "expected exactly one column, found {}",
                self.row.len()
            ))),
        }
    }
}

macro_rules! forward_to_single_column {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                self.single_column()?.$method(visitor)
            }
        )*
    };
}

impl<'de, 'a> Deserializer<'de> for RowDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(RowMap::new(self.row, &[], self.zeroed))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_map(RowMap::new(self.row, fields, self.zeroed))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(RowSeq {
            values: self.row.iter().collect::<Vec<_>>().into_iter(),
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    forward_to_single_column! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf
    }

    forward_to_deserialize_any! {
        i128 u128 unit unit_struct enum identifier ignored_any
    }
}

#[derive(Clone, Copy)]
struct Entry<'a> {
    key: &'a str,
    column: &'a str,
    value: &'a SqlValue,
}

struct RowMap<'a> {
    entries: std::vec::IntoIter<Entry<'a>>,
    zeros: std::vec::IntoIter<&'static str>,
    pending: Option<Pending<'a>>,
}

enum Pending<'a> {
    Column(Entry<'a>),
    Zero(&'static str),
}

impl<'a> RowMap<'a> {
    fn new(
        row: &'a RawRow,
        fields: &'static [&'static str],
        zeroed: &[&'static str],
    ) -> Self {
        let mut entries: Vec<Entry<'a>> = Vec::with_capacity(row.len());
        for (column, value) in row.iter() {
            let key = resolve_key(column, fields);
            // two labels resolving to one field: the later column wins
            match entries.iter_mut().find(|e| e.key == key) {
                Some(existing) => {
                    existing.column = column;
                    existing.value = value;
                }
                None => entries.push(Entry { key, column, value }),
            }
        }
        let zeros: Vec<&'static str> = zeroed
            .iter()
            .copied()
            .filter(|field| !entries.iter().any(|e| e.key == *field))
            .collect();
        Self {
            entries: entries.into_iter(),
            zeros: zeros.into_iter(),
            pending: None,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for RowMap<'a> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        let (key, pending) = match self.entries.next() {
            Some(entry) => (entry.key, Pending::Column(entry)),
            None => match self.zeros.next() {
                Some(field) => (field, Pending::Zero(field)),
                None => return Ok(None),
            },
        };
        self.pending = Some(pending);
        seed.deserialize(StrDeserializer::<DecodeError>::new(key))
            .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        match self.pending.take() {
            Some(Pending::Column(entry)) => seed
                .deserialize(ValueDeserializer::new(entry.column, entry.value))
                .map_err(|e| e.at(entry.column)),
            Some(Pending::Zero(field)) => seed
                .deserialize(ZeroDeserializer)
                .map_err(|e| e.at(field)),
            None => Err(DecodeError::new("value requested before key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len() + self.zeros.len())
    }
}

struct RowSeq<'a> {
    values: std::vec::IntoIter<(&'a str, &'a SqlValue)>,
}

impl<'de, 'a> SeqAccess<'de> for RowSeq<'a> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.values.next() {
            Some((column, value)) => seed
                .deserialize(ValueDeserializer::new(column, value))
                .map(Some)
                .map_err(|e| e.at(column)),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len())
    }
}

/// Deserializer for one column value.
#[derive(Clone, Copy)]
pub struct ValueDeserializer<'a> {
    column: &'a str,
    value: &'a SqlValue,
}

impl<'a> ValueDeserializer<'a> {
    pub fn new(column: &'a str, value: &'a SqlValue) -> Self {
        Self { column, value }
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(message).at(self.column)
    }

    fn present(&self, target: &str) -> Result<&'a SqlValue, DecodeError> {
        if self.value.is_null() {
            Err(self.error(format!("NULL cannot be mapped to {}", target)))
        } else {
            Ok(self.value)
        }
    }

    fn json(&self, text: &str) -> Result<serde_json::Value, DecodeError> {
        serde_json::from_str(text).map_err(|e| self.error(format!("invalid JSON text: {}", e)))
    }

    fn compound<'de, V: Visitor<'de>>(self, target: &str, visitor: V) -> Result<V::Value, DecodeError> {
        match self.present(target)? {
            SqlValue::Text(s) => self
                .json(s)?
                .deserialize_any(visitor)
                .map_err(|e| self.error(e.to_string())),
            other => Err(self.error(format!(
                "cannot convert {} {} to {}",
                other.type_name(),
                other,
                target
            ))),
        }
    }
}

/// chrono targets, recognised by what their visitor expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Temporal {
    Date,
    DateTime,
    /// `DateTime<Tz>`, read from RFC 3339 text.
    Zoned,
}

impl Temporal {
    fn expected_by<'de, V: Visitor<'de>>(visitor: &V) -> Option<Self> {
        let expected: &dyn de::Expected = visitor;
        match expected.to_string().as_str() {
            "a formatted date string" => Some(Self::Date),
            "a formatted date and time string" => Some(Self::DateTime),
            "an RFC 3339 formatted date and time string" => Some(Self::Zoned),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::DateTime | Self::Zoned => "date-time",
        }
    }

    /// Render `value` in the text form chrono parses, using the loose input rules.
    fn render(self, value: &SqlValue) -> Result<String, String> {
        match self {
            Self::Date => coerce::to_date(value).map(|d| d.format("%Y-%m-%d").to_string()),
            Self::DateTime => coerce::to_datetime(value).map(|dt| coerce::format_datetime(&dt)),
            Self::Zoned => coerce::to_datetime(value).map(|dt| dt.and_utc().to_rfc3339()),
        }
    }
}

macro_rules! deserialize_integer {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let target = stringify!($ty);
                let wide = coerce::to_i64(self.present(target)?).map_err(|m| self.error(m))?;
                let narrow = <$ty>::try_from(wide)
                    .map_err(|_| self.error(format!("value {} out of range for {}", wide, target)))?;
                visitor.$visit(narrow)
            }
        )*
    };
}

impl<'de, 'a> Deserializer<'de> for ValueDeserializer<'a> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            SqlValue::Null => visitor.visit_unit(),
            SqlValue::Bool(v) => visitor.visit_bool(*v),
            SqlValue::Int(v) => visitor.visit_i64(*v),
            SqlValue::Float(v) => visitor.visit_f64(*v),
            SqlValue::Text(v) => visitor.visit_str(v),
            SqlValue::Bytes(v) => visitor.visit_bytes(v),
            SqlValue::DateTime(v) => visitor.visit_string(coerce::format_datetime(v)),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let value = coerce::to_bool(self.present("bool")?).map_err(|m| self.error(m))?;
        visitor.visit_bool(value)
    }

    deserialize_integer! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let value = coerce::to_f64(self.present("f32")?).map_err(|m| self.error(m))?;
        visitor.visit_f32(value as f32)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let value = coerce::to_f64(self.present("f64")?).map_err(|m| self.error(m))?;
        visitor.visit_f64(value)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let text = coerce::to_string(self.present("char")?).map_err(|m| self.error(m))?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(self.error(format!("expected a single character, found '{}'", text))),
        }
    }

    /// chrono types deserialize through here; their values take the date-time
    /// coercions before chrono parses them.
    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if let Some(temporal) = Temporal::expected_by(&visitor) {
            let value = self.present(temporal.name())?;
            let text = temporal.render(value).map_err(|m| self.error(m))?;
            return visitor.visit_string(text);
        }
        match self.present("string")? {
            SqlValue::Text(v) => visitor.visit_str(v),
            other => {
                let text = coerce::to_string(other).map_err(|m| self.error(m))?;
                visitor.visit_string(text)
            }
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.present("bytes")? {
            SqlValue::Bytes(v) => visitor.visit_bytes(v),
            other => {
                let bytes = coerce::to_bytes(other).map_err(|m| self.error(m))?;
                visitor.visit_byte_buf(bytes)
            }
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.value.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    /// `Vec<u8>` targets read binary columns; text holding a JSON array also works.
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            SqlValue::Bytes(v) => {
                visitor.visit_seq(SeqDeserializer::<_, DecodeError>::new(v.iter().copied()))
            }
            _ => self.compound("sequence", visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.compound("map", visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.compound("struct", visitor)
    }

    /// Unit variants by name (text) or by index (integer).
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.present("enum")? {
            SqlValue::Text(v) => visitor.visit_enum(StrDeserializer::<DecodeError>::new(v)),
            SqlValue::Int(v) => {
                let idx = u32::try_from(*v)
                    .map_err(|_| self.error(format!("invalid variant index {}", v)))?;
                visitor.visit_enum(U32Deserializer::<DecodeError>::new(idx))
            }
            other => Err(self.error(format!(
                "cannot convert {} {} to enum",
                other.type_name(),
                other
            ))),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

/// Zero value for a struct field no column supplied.
struct ZeroDeserializer;

macro_rules! deserialize_zero {
    ($($method:ident => $visit:ident($zero:expr)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                visitor.$visit($zero)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ZeroDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    deserialize_zero! {
        deserialize_bool => visit_bool(false),
        deserialize_i8 => visit_i8(0),
        deserialize_i16 => visit_i16(0),
        deserialize_i32 => visit_i32(0),
        deserialize_i64 => visit_i64(0),
        deserialize_i128 => visit_i128(0),
        deserialize_u8 => visit_u8(0),
        deserialize_u16 => visit_u16(0),
        deserialize_u32 => visit_u32(0),
        deserialize_u64 => visit_u64(0),
        deserialize_u128 => visit_u128(0),
        deserialize_f32 => visit_f32(0.0),
        deserialize_f64 => visit_f64(0.0),
        deserialize_char => visit_char('\0'),
        deserialize_bytes => visit_bytes(&[]),
        deserialize_byte_buf => visit_byte_buf(Vec::new()),
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match Temporal::expected_by(&visitor) {
            Some(temporal) => Err(DecodeError::new(format!(
                "no column supplied this {} field",
                temporal.name()
            ))),
            None => visitor.visit_str(""),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(SeqDeserializer::<_, DecodeError>::new(std::iter::empty::<u8>()))
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(MapDeserializer::<_, DecodeError>::new(
            std::iter::empty::<(u8, u8)>(),
        ))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Err(DecodeError::new(format!("no column supplied this {} field", name)))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_str("")
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}
