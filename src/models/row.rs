//! Raw result rows.

use super::value::SqlValue;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One fetched row: column labels in driver order, each paired with its value.
///
/// Labels keep their original case. When a result carries the same label twice
/// the later value replaces the earlier one at the earlier position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Add a column value, overwriting any earlier value with the same label.
    pub fn insert(&mut self, label: impl Into<String>, value: SqlValue) {
        let label = label.into();
        match self.columns.iter().position(|c| *c == label) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(label);
                self.values.push(value);
            }
        }
    }

    /// Value for an exact label.
    pub fn get(&self, label: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == label)
            .map(|idx| &self.values[idx])
    }

    /// Value at a zero-based column position.
    pub fn get_index(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    /// First column, the one scalar reads use.
    pub fn first(&self) -> Option<(&str, &SqlValue)> {
        self.iter().next()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row into `(label, value)` pairs.
    pub fn into_pairs(self) -> Vec<(String, SqlValue)> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

impl FromIterator<(String, SqlValue)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (label, value) in iter {
            row.insert(label, value);
        }
        row
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (label, value) in self.iter() {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_driver_order() {
        let mut row = RawRow::new();
        row.insert("id", SqlValue::Int(1));
        row.insert("Title", SqlValue::from("x"));
        assert_eq!(row.columns(), &["id".to_string(), "Title".to_string()]);
        assert_eq!(row.first(), Some(("id", &SqlValue::Int(1))));
        assert!(row.get("title").is_none());
    }

    #[test]
    fn test_duplicate_label_last_write_wins() {
        let row: RawRow = vec![
            ("a".to_string(), SqlValue::Int(1)),
            ("b".to_string(), SqlValue::Int(2)),
            ("a".to_string(), SqlValue::Int(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("a"), Some(&SqlValue::Int(3)));
        assert_eq!(row.get_index(0), Some(&SqlValue::Int(3)));
    }

    #[test]
    fn test_serialize_as_map() {
        let mut row = RawRow::new();
        row.insert("id", SqlValue::Int(7));
        row.insert("name", SqlValue::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":7,"name":null}"#);
    }
}
