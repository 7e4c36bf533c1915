//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Backend driver (connect, execute, fetch) over sqlx
//! - Per-context connection management and transactions
//! - Statement execution with placeholder validation
//! - Row decoding into raw values
//! - Database dispatch macros for reducing code duplication

pub(crate) mod macros;
pub mod connection;
pub mod driver;
pub mod executor;
pub mod params;
pub mod transaction;
pub mod types;

pub use connection::{ConnectionManager, ManagedConnection};
pub use driver::{DbConnection, Driver};
pub use executor::QueryExecutor;
pub use types::TypeCategory;
