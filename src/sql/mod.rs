//! Statement building and terminal operations.
//!
//! ```no_run
//! use simpledb::{Database, DbResult};
//!
//! fn titles(db: &Database, ids: &[i64]) -> DbResult<Vec<String>> {
//!     let session = db.session();
//!     let mut sql = session.gen_sql();
//!     sql.append("SELECT title FROM article WHERE published = ?", (true,))
//!         .append_in("AND id IN (?)", ids)?
//!         .append("ORDER BY id", ());
//!     sql.select_scalars()
//! }
//! ```

pub mod builder;
pub mod params;
pub mod placeholder;

pub use builder::StatementBuilder;
pub use params::IntoParams;

use crate::database::Session;
use crate::error::DbResult;
use crate::mapper::{self, Scalar};
use crate::models::{RawRow, SqlValue, Statement};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;

/// A statement under construction, bound to the session that will run it.
///
/// Terminal operations execute the accumulated statement on the session's
/// connection; the builder can be run again afterwards.
#[derive(Debug)]
pub struct Sql<'s> {
    session: &'s Session,
    builder: StatementBuilder,
}

impl<'s> Sql<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            builder: StatementBuilder::new(session.database().config().db_type),
        }
    }

    /// Append a fragment and its parameters.
    pub fn append(&mut self, text: &str, params: impl IntoParams) -> &mut Self {
        self.builder.append(text, params);
        self
    }

    /// Append `template` with its first `?` expanded to one placeholder per value.
    ///
    /// An empty list substitutes `NULL`, so `IN (?)` matches nothing.
    pub fn append_in(&mut self, template: &str, values: impl IntoParams) -> DbResult<&mut Self> {
        self.builder.append_in(template, values)?;
        Ok(self)
    }

    pub fn statement(&self) -> Statement {
        self.builder.build()
    }

    pub fn sql(&self) -> String {
        self.builder.sql()
    }

    pub fn params(&self) -> &[SqlValue] {
        self.builder.params()
    }

    /// Run an INSERT and return the generated key, if any.
    pub fn insert(&self) -> DbResult<Option<i64>> {
        let db = self.session.database();
        let outcome =
            db.executor()
                .execute_insert(db.manager(), self.session.context(), &self.statement())?;
        if outcome.rows_affected == 0 {
            return Ok(None);
        }
        Ok(outcome.last_insert_id)
    }

    /// Run an UPDATE and return the number of affected rows.
    pub fn update(&self) -> DbResult<u64> {
        let db = self.session.database();
        db.executor()
            .execute_update(db.manager(), self.session.context(), &self.statement())
    }

    /// Run a DELETE and return the number of affected rows.
    pub fn delete(&self) -> DbResult<u64> {
        self.update()
    }

    pub fn select_rows(&self) -> DbResult<Vec<RawRow>> {
        let db = self.session.database();
        db.executor()
            .execute_query(db.manager(), self.session.context(), &self.statement())
    }

    /// First row, or `None` when nothing matched.
    pub fn select_row(&self) -> DbResult<Option<RawRow>> {
        Ok(self.select_rows()?.into_iter().next())
    }

    pub fn select_rows_as<T: DeserializeOwned>(&self) -> DbResult<Vec<T>> {
        mapper::to_records(&self.select_rows()?)
    }

    pub fn select_row_as<T: DeserializeOwned>(&self) -> DbResult<Option<T>> {
        self.select_row()?.as_ref().map(mapper::to_record).transpose()
    }

    /// Column 1 of the first row; `None` for no row or NULL.
    pub fn select_scalar<T: Scalar>(&self) -> DbResult<Option<T>> {
        let rows = self.select_rows()?;
        mapper::to_scalar(rows.first())
    }

    /// Column 1 of every row, NULLs skipped.
    pub fn select_scalars<T: Scalar>(&self) -> DbResult<Vec<T>> {
        mapper::to_scalars(&self.select_rows()?)
    }

    pub fn select_long(&self) -> DbResult<Option<i64>> {
        self.select_scalar()
    }

    pub fn select_string(&self) -> DbResult<Option<String>> {
        self.select_scalar()
    }

    pub fn select_boolean(&self) -> DbResult<Option<bool>> {
        self.select_scalar()
    }

    pub fn select_datetime(&self) -> DbResult<Option<NaiveDateTime>> {
        self.select_scalar()
    }

    pub fn select_longs(&self) -> DbResult<Vec<i64>> {
        self.select_scalars()
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::error::DbError;
    use crate::models::SqlValue;

    #[test]
    fn test_builder_does_not_touch_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("sql.db").display()
        ))
        .unwrap();
        let session = db.session();
        let mut sql = session.gen_sql();
        sql.append("SELECT * FROM t WHERE a = ?", (1,))
            .append_in("AND b IN (?)", ["x", "y"])
            .unwrap();
        assert_eq!(sql.sql(), "SELECT * FROM t WHERE a = ? AND b IN (?, ?)");
        assert_eq!(sql.params()[2], SqlValue::from("y"));
        assert!(!session.has_connection().unwrap());
    }

    #[test]
    fn test_placeholder_mismatch_is_binding_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("sql.db").display()
        ))
        .unwrap();
        let session = db.session();
        let mut sql = session.gen_sql();
        sql.append("SELECT ? + ?", (1,));
        assert!(matches!(sql.select_long(), Err(DbError::Binding { .. })));
    }
}
