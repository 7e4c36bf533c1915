//! Data models for simpledb.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionInfo, ConnectionStats, ContextId, ContextState, DatabaseType};
pub use query::{Statement, WriteOutcome};
pub use row::RawRow;
pub use value::{SqlValue, describe_params};
