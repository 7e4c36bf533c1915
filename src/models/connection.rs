//! Connection-related data models.
//!
//! This module defines the backend kinds, the execution-context token that owns a
//! connection, and the state reported for each context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// True when the backend expects `$1, $2, ...` instead of `?`.
    pub fn uses_numbered_placeholders(&self) -> bool {
        matches!(self, Self::PostgreSQL)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Token identifying one execution context.
///
/// Every connection-manager operation is keyed by a `ContextId`; a context owns
/// at most one open connection at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContextId(String);

impl ContextId {
    /// Generate a fresh token (`ctx_<uuid>`).
    pub fn new() -> Self {
        Self(format!("ctx_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// No connection is held
    NoConnection,
    /// Connection open in auto-commit mode
    Idle,
    InTransaction,
}

impl ContextState {
    pub fn has_connection(&self) -> bool {
        !matches!(self, Self::NoConnection)
    }

    pub fn is_in_transaction(&self) -> bool {
        matches!(self, Self::InTransaction)
    }
}

/// Snapshot of a context's managed connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Serial number assigned when the connection was opened
    pub connection_id: u64,
    pub context: ContextId,
    pub database_type: DatabaseType,
    pub in_transaction: bool,
    pub auto_commit: bool,
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

/// Connection manager counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub opened: u64,
    pub closed: u64,
    /// Handles currently cached, one per context at most
    pub live: usize,
}
