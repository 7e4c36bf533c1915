//! Statement-related data models.

use super::value::{SqlValue, describe_params};
use serde::Serialize;

/// A materialized statement: final SQL text plus its ordered parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Create a new statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Add a parameter to this statement.
    pub fn with_param(mut self, param: impl Into<SqlValue>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Parameters rendered for logs and error messages.
    pub fn describe_params(&self) -> String {
        describe_params(&self.params)
    }
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Generated key, when the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_builder_style() {
        let stmt = Statement::new("SELECT * FROM t WHERE a = ? AND b = ?")
            .with_param(1)
            .with_param("x");
        assert_eq!(stmt.params.len(), 2);
        assert_eq!(stmt.describe_params(), "[1, 'x']");
    }

    #[test]
    fn test_write_outcome_serialization() {
        let outcome = WriteOutcome {
            rows_affected: 1,
            last_insert_id: None,
        };
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json, serde_json::json!({ "rows_affected": 1 }));
    }
}
