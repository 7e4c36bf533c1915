//! Statement execution engine.
//!
//! This module provides statement execution with support for:
//! - Placeholder/parameter count validation before anything reaches the driver
//! - PostgreSQL placeholder renumbering (`?` to `$n`)
//! - Generated key retrieval
//! - Optional SQL tracing
//!
//! Every statement runs on the calling context's managed connection. Results are
//! fully fetched before the connection is handed back.

use crate::db::connection::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::models::{
    ContextId, DatabaseType, RawRow, SqlValue, Statement, WriteOutcome, describe_params,
};
use crate::sql::placeholder;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info};

/// Log target used for traced statements.
pub const TRACE_TARGET: &str = "simpledb::sql";

/// Statement executor bound to one database backend.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    db_type: DatabaseType,
    trace_sql: bool,
}

impl QueryExecutor {
    /// Create a new executor.
    pub fn new(db_type: DatabaseType, trace_sql: bool) -> Self {
        Self { db_type, trace_sql }
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_sql
    }

    /// Execute an INSERT/UPDATE/DELETE (or DDL) and return affected rows.
    pub fn execute_update(
        &self,
        manager: &ConnectionManager,
        ctx: &ContextId,
        stmt: &Statement,
    ) -> DbResult<u64> {
        let sql = self.prepare(stmt)?;
        let start = Instant::now();
        self.trace(ctx, "update", &sql, stmt);

        let outcome = manager.with_connection(ctx, |driver, managed| {
            driver.execute(managed.connection_mut()?, &sql, &stmt.params)
        })?;

        debug!(
            context = %ctx,
            rows_affected = outcome.rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(outcome.rows_affected)
    }

    /// Execute an INSERT and return affected rows plus the generated key.
    ///
    /// PostgreSQL has no last-insert-id; a `RETURNING *` clause is appended when the
    /// statement has none and the first returned column is used as the key.
    pub fn execute_insert(
        &self,
        manager: &ConnectionManager,
        ctx: &ContextId,
        stmt: &Statement,
    ) -> DbResult<WriteOutcome> {
        let sql = self.prepare(stmt)?;
        let start = Instant::now();

        let outcome = if self.db_type == DatabaseType::PostgreSQL {
            let sql = with_returning(&sql);
            self.trace(ctx, "insert", &sql, stmt);
            let rows = manager.with_connection(ctx, |driver, managed| {
                driver.fetch(managed.connection_mut()?, &sql, &stmt.params)
            })?;
            WriteOutcome {
                rows_affected: rows.len() as u64,
                last_insert_id: rows.first().and_then(generated_key),
            }
        } else {
            self.trace(ctx, "insert", &sql, stmt);
            manager.with_connection(ctx, |driver, managed| {
                driver.execute(managed.connection_mut()?, &sql, &stmt.params)
            })?
        };

        debug!(
            context = %ctx,
            rows_affected = outcome.rows_affected,
            last_insert_id = ?outcome.last_insert_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Insert executed"
        );
        Ok(outcome)
    }

    /// Execute a SELECT and return every row.
    pub fn execute_query(
        &self,
        manager: &ConnectionManager,
        ctx: &ContextId,
        stmt: &Statement,
    ) -> DbResult<Vec<RawRow>> {
        let sql = self.prepare(stmt)?;
        let start = Instant::now();
        self.trace(ctx, "query", &sql, stmt);

        let rows = manager.with_connection(ctx, |driver, managed| {
            driver.fetch(managed.connection_mut()?, &sql, &stmt.params)
        })?;

        debug!(
            context = %ctx,
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(rows)
    }

    /// Validate placeholder count and produce the SQL the backend expects.
    fn prepare<'a>(&self, stmt: &'a Statement) -> DbResult<Cow<'a, str>> {
        let expected = placeholder::count_placeholders(&stmt.sql, self.db_type);
        if expected != stmt.params.len() {
            return Err(DbError::binding(
                format!(
                    "statement has {} placeholder(s) but {} parameter(s) were supplied",
                    expected,
                    stmt.params.len()
                ),
                stmt.sql.clone(),
                describe_params(&stmt.params),
            ));
        }
        if self.db_type.uses_numbered_placeholders() {
            Ok(Cow::Owned(placeholder::renumber(&stmt.sql)))
        } else {
            Ok(Cow::Borrowed(&stmt.sql))
        }
    }

    fn trace(&self, ctx: &ContextId, kind: &str, sql: &str, stmt: &Statement) {
        debug!(
            context = %ctx,
            kind = kind,
            sql = %sql,
            params = stmt.params.len(),
            "Executing statement"
        );
        if self.trace_sql {
            info!(
                target: TRACE_TARGET,
                context = %ctx,
                sql = %sql,
                params = %describe_params(&stmt.params),
                "{}",
                sql
            );
        }
    }
}

/// Append `RETURNING *` unless the statement already returns something.
fn with_returning(sql: &str) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    let has_returning = trimmed
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("returning"));
    if has_returning {
        trimmed.to_string()
    } else {
        format!("{} RETURNING *", trimmed)
    }
}

fn generated_key(row: &RawRow) -> Option<i64> {
    match row.first()?.1 {
        SqlValue::Int(v) => Some(*v),
        SqlValue::Text(s) => s.parse().ok(),
        _ => None,
    }
}
