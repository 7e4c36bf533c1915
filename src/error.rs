//! Error types for simpledb.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Driver failures are wrapped at the call site together with the SQL text and the
//! bound parameters so that a failing statement can be diagnosed from the error alone.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("No open connection for context {context}")]
    NoConnection { context: String },

    #[error("Transaction error: {message} (context: {context})")]
    TransactionState { message: String, context: String },

    #[error("Parameter binding failed: {message} (sql: {sql}, params: {params})")]
    Binding {
        message: String,
        sql: String,
        params: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Query failed: {message} (sql: {sql}, params: {params})")]
    Query {
        message: String,
        sql: String,
        /// Rendered parameter list, e.g. `[1, 'abc', NULL]`
        params: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Mapping failed: {message}")]
    Mapping {
        /// Column label, when known
        column: Option<String>,
        message: String,
    },

    #[error("Malformed IN template (no '?' placeholder): {template}")]
    MalformedTemplate { template: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a no-connection error for the given context.
    pub fn no_connection(context: impl ToString) -> Self {
        Self::NoConnection {
            context: context.to_string(),
        }
    }

    /// Create a transaction state error.
    pub fn transaction_state(message: impl Into<String>, context: impl ToString) -> Self {
        Self::TransactionState {
            message: message.into(),
            context: context.to_string(),
        }
    }

    /// Create a binding error detected before the statement reached the driver.
    pub fn binding(
        message: impl Into<String>,
        sql: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self::Binding {
            message: message.into(),
            sql: sql.into(),
            params: params.into(),
            source: None,
        }
    }

    /// Wrap a driver failure raised while running `sql` with `params`.
    ///
    /// Encode failures are reported as binding errors and everything else as query
    /// errors. Both keep the driver error as their source.
    pub fn query(sql: impl Into<String>, params: impl Into<String>, err: sqlx::Error) -> Self {
        let sql = sql.into();
        match err {
            err @ sqlx::Error::Encode(_) => Self::Binding {
                message: err.to_string(),
                sql,
                params: params.into(),
                source: Some(err),
            },
            err => {
                let (message, sql_state) = match &err {
                    sqlx::Error::Database(db_err) => (
                        db_err.message().to_string(),
                        db_err.code().map(|c| c.to_string()),
                    ),
                    other => (other.to_string(), None),
                };
                Self::Query {
                    message,
                    sql,
                    params: params.into(),
                    sql_state,
                    source: Some(err),
                }
            }
        }
    }

    /// Create a mapping error.
    pub fn mapping(column: Option<&str>, message: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.map(String::from),
            message: message.into(),
        }
    }

    /// Create a malformed template error.
    pub fn malformed_template(template: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            template: template.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::NoConnection { .. } => Some("Run a statement before closing the session"),
            Self::MalformedTemplate { .. } => Some("Add a '?' where the value list belongs"),
            _ => None,
        }
    }

    /// True if the underlying driver reported that the connection itself is gone.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Query {
                source: Some(err), ..
            } => is_link_failure(err),
            _ => false,
        }
    }

    /// Check if this error is retryable by the caller.
    ///
    /// This layer never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. }) || self.is_connection_lost()
    }
}

/// Driver errors that leave the connection unusable.
pub(crate) fn is_link_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::PoolClosed
    )
}

/// Convert sqlx errors raised outside of a statement (connect, close, ping).
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::Database(db_err) => DbError::connection(
                db_err.message().to_string(),
                "Verify the database exists and the user may access it",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            sqlx::Error::ColumnDecode { index, source } => DbError::Mapping {
                column: Some(index),
                message: source.to_string(),
            },
            sqlx::Error::Decode(source) => DbError::mapping(None, source.to_string()),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connection("refused", "Check that the server is running");
        assert_eq!(err.suggestion(), Some("Check that the server is running"));
        assert!(DbError::internal("boom").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::transaction_state("already active", "ctx_1").is_retryable());
        assert!(!DbError::malformed_template("WHERE id IN ()").is_retryable());
    }

    #[test]
    fn test_query_error_keeps_sql_and_params() {
        let err = DbError::query(
            "SELECT * FROM missing WHERE id = ?",
            "[1]",
            sqlx::Error::RowNotFound,
        );
        let text = err.to_string();
        assert!(text.contains("SELECT * FROM missing"));
        assert!(text.contains("[1]"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_query_error_link_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = DbError::query("SELECT 1", "[]", sqlx::Error::Io(io));
        assert!(err.is_connection_lost());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_encode_failure_becomes_binding_error() {
        let err = DbError::query("INSERT INTO t VALUES (?)", "[1]", sqlx::Error::Encode("bad".into()));
        match &err {
            DbError::Binding { params, source, .. } => {
                assert_eq!(params, "[1]");
                assert!(matches!(source, Some(sqlx::Error::Encode(_))));
            }
            other => panic!("expected binding error, got {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_transaction_state_message() {
        let err = DbError::transaction_state("Transaction already active", "ctx_abc");
        assert!(err.to_string().contains("ctx_abc"));
    }
}
