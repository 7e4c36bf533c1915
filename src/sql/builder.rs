//! Fragment accumulation for one logical statement.

use super::params::IntoParams;
use super::placeholder;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, SqlValue, Statement};

/// Accumulates SQL fragments and their parameters.
///
/// The final SQL is every fragment joined by a single space; the final parameter
/// list is every fragment's parameters in call order. Templates are scanned for
/// placeholders with the lexical rules of `db_type`.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    db_type: DatabaseType,
    fragments: Vec<String>,
    params: Vec<SqlValue>,
}

impl StatementBuilder {
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            fragments: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Append a fragment and its parameters.
    pub fn append(&mut self, text: &str, params: impl IntoParams) -> &mut Self {
        self.fragments.push(text.to_string());
        self.params.extend(params.into_params());
        self
    }

    /// Append `template` with its first `?` expanded to one placeholder per value.
    ///
    /// An empty `values` list replaces the placeholder with `NULL` and binds nothing,
    /// so `id IN (?)` becomes `id IN (NULL)`.
    pub fn append_in(&mut self, template: &str, values: impl IntoParams) -> DbResult<&mut Self> {
        let values = values.into_params();
        let text = placeholder::expand_first(template, values.len(), self.db_type)
            .ok_or_else(|| DbError::malformed_template(template))?;
        self.fragments.push(text);
        self.params.extend(values);
        Ok(self)
    }

    pub fn sql(&self) -> String {
        self.fragments.join(" ")
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Materialize the accumulated fragments.
    pub fn build(&self) -> Statement {
        Statement::with_params(self.sql(), self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_join_with_single_space() {
        let mut builder = StatementBuilder::new(DatabaseType::SQLite);
        builder
            .append("SELECT * FROM article", ())
            .append("WHERE id > ?", (10,))
            .append("AND title = ?", ("x",));
        let stmt = builder.build();
        assert_eq!(stmt.sql, "SELECT * FROM article WHERE id > ? AND title = ?");
        assert_eq!(stmt.params, vec![SqlValue::Int(10), SqlValue::from("x")]);
    }

    #[test]
    fn test_append_in_expands_placeholders() {
        let mut builder = StatementBuilder::new(DatabaseType::SQLite);
        builder
            .append("SELECT * FROM article WHERE status = ?", ("open",))
            .append_in("AND id IN (?)", [1, 2, 3])
            .unwrap()
            .append("ORDER BY id", ());
        let stmt = builder.build();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM article WHERE status = ? AND id IN (?, ?, ?) ORDER BY id"
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::from("open"),
                SqlValue::Int(1),
                SqlValue::Int(2),
                SqlValue::Int(3),
            ]
        );
    }

    #[test]
    fn test_append_in_empty_list_is_null() {
        let mut builder = StatementBuilder::new(DatabaseType::SQLite);
        builder.append("SELECT * FROM article", ());
        builder.append_in("WHERE id IN (?)", Vec::<i64>::new()).unwrap();
        let stmt = builder.build();
        assert_eq!(stmt.sql, "SELECT * FROM article WHERE id IN (NULL)");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_append_in_without_placeholder() {
        let mut builder = StatementBuilder::new(DatabaseType::SQLite);
        let err = builder.append_in("WHERE id IN ()", [1]).unwrap_err();
        assert!(matches!(err, DbError::MalformedTemplate { .. }));
        // nothing was appended
        assert!(builder.is_empty());
        assert!(builder.params().is_empty());
    }

    #[test]
    fn test_append_in_follows_mysql_escapes() {
        let mut builder = StatementBuilder::new(DatabaseType::MySQL);
        builder
            .append_in(r"WHERE note <> 'it\'s?' AND id IN (?)", [1, 2])
            .unwrap();
        assert_eq!(builder.sql(), r"WHERE note <> 'it\'s?' AND id IN (?, ?)");
    }
}
