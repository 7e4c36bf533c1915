//! Database dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate database-specific
//! implementations while maintaining linear readability. The macros expand
//! at compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbConnection` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::execute(c, sql, params).await,
///     Postgres(c) => postgres::execute(c, sql, params).await,
///     SQLite(c) => sqlite::execute(c, sql, params).await,
/// });
/// ```
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::driver::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

pub(crate) use impl_db_dispatch;
