//! simpledb
//!
//! A small blocking SQL access layer for SQLite, PostgreSQL and MySQL/MariaDB:
//! - Fluent statement building with `?` placeholders and `IN (?)` expansion
//! - One connection per execution context, reused until closed
//! - Explicit transactions bound to that connection
//! - Row mapping into scalars, raw rows, or any serde `Deserialize` type
//!
//! ```no_run
//! use serde::Deserialize;
//! use simpledb::{Database, DbResult};
//!
//! #[derive(Deserialize)]
//! struct Article {
//!     id: i64,
//!     title: String,
//! }
//!
//! fn main() -> DbResult<()> {
//!     let db = Database::open("sqlite:articles.db?mode=rwc")?;
//!     let session = db.session();
//!
//!     session.begin_transaction()?;
//!     let id = session
//!         .gen_sql()
//!         .append("INSERT INTO article (title) VALUES (?)", ("Hello",))
//!         .insert()?;
//!     session.commit()?;
//!
//!     let article: Option<Article> = session
//!         .gen_sql()
//!         .append("SELECT id, title FROM article WHERE id = ?", (id,))
//!         .select_row_as()?;
//!     assert!(article.is_some());
//!     Ok(())
//! }
//! ```
//!
//! The API blocks the calling thread and must not be used from inside an async
//! runtime.

pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod mapper;
pub mod models;
pub mod sql;

pub use config::DbConfig;
pub use database::{Database, Session};
pub use error::{DbError, DbResult};
pub use mapper::Scalar;
pub use models::{
    ConnectionInfo, ConnectionStats, ContextId, ContextState, DatabaseType, RawRow, SqlValue,
    Statement, WriteOutcome,
};
pub use sql::{IntoParams, Sql};
