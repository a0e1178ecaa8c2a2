/// Client Seam Module
///
/// This module defines the abstract surface dbglue expects from an underlying
/// database client library: connect, prepare, execute, fetch. The retry and
/// timeout machinery in the connection layer only ever talks to these traits,
/// which keeps it backend-agnostic and lets tests script transient faults.
use std::fmt;
use std::sync::Arc;

use crate::core::db::params::ConnectionKey;
use crate::core::Result;

/// A single database value as carried across the client seam.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Converts the value into a JSON value for the export layer.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(t) => serde_json::Value::String(t.clone()),
            Value::Blob(b) => serde_json::Value::String(format!("<BLOB: {} bytes>", b.len())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(t) => write!(f, "{}", t),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

/// Outcome of executing a statement: either a result set is available for
/// fetching, or a number of rows was affected by a data-modifying statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecResult {
    /// A result set with the given number of buffered rows is ready.
    Rows(usize),
    /// The statement affected this many rows.
    Affected(u64),
}

impl ExecResult {
    /// Rows affected by a data-modifying statement, if applicable.
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            ExecResult::Rows(_) => None,
            ExecResult::Affected(n) => Some(*n),
        }
    }
}

/// Enumerated set of operations forwarded to the underlying client.
///
/// Passthrough is deliberately an explicit allow-list rather than open
/// dispatch; safe mode further restricts it to the read-only subset.
#[derive(Debug, Clone, PartialEq)]
pub enum PassthroughOp {
    /// Row id generated by the most recent successful insert.
    LastInsertId,
    /// Number of rows modified by the most recent data-modifying statement.
    ChangeCount,
    /// Version string of the underlying client library.
    ClientVersion,
    /// Run a raw batch of statements, bypassing prepare/execute. Blocked in
    /// safe mode.
    ExecuteBatch(String),
}

impl PassthroughOp {
    /// Whether this operation is permitted while safe mode is enabled.
    pub fn allowed_in_safe_mode(&self) -> bool {
        !matches!(self, PassthroughOp::ExecuteBatch(_))
    }
}

/// Factory for client sessions. One implementation per backing client library.
pub trait DbClient: Send + Sync + fmt::Debug {
    /// Opens a session to the database identified by the connection key.
    fn connect(&self, key: &ConnectionKey) -> Result<Arc<dyn ClientSession>>;
}

/// One live session to the database server.
pub trait ClientSession: Send + Sync + fmt::Debug {
    /// Prepares a statement for later execution.
    fn prepare(&self, sql: &str) -> Result<Arc<dyn ClientStatement>>;

    /// Forwards an allow-listed operation to the underlying client.
    fn client_op(&self, op: &PassthroughOp) -> Result<Value>;

    /// Closes the session. Further operations on it or its statements fail.
    fn close(&self);
}

/// One prepared statement plus the cursor of its most recent execution.
pub trait ClientStatement: Send + Sync + fmt::Debug {
    /// Executes the statement with the given bound values, replacing any
    /// previously buffered result rows.
    fn run(&self, params: &[Value]) -> Result<ExecResult>;

    /// Column names of the most recent execution's result set.
    fn columns(&self) -> Vec<String>;

    /// Pops the next buffered result row, if any.
    fn fetch_row(&self) -> Option<Vec<Value>>;

    /// Number of rows still buffered in the cursor.
    fn row_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(1.5).to_string(), "1.5");
        assert_eq!(Value::Text("abc".into()).to_string(), "abc");
        assert_eq!(Value::Blob(vec![1, 2, 3]).to_string(), "<BLOB: 3 bytes>");
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(Value::Integer(5).to_json(), serde_json::json!(5));
        assert_eq!(Value::Text("x".into()).to_json(), serde_json::json!("x"));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_exec_result_rows_affected() {
        assert_eq!(ExecResult::Affected(3).rows_affected(), Some(3));
        assert_eq!(ExecResult::Rows(10).rows_affected(), None);
    }

    #[test]
    fn test_safe_mode_allow_list() {
        assert!(PassthroughOp::LastInsertId.allowed_in_safe_mode());
        assert!(PassthroughOp::ChangeCount.allowed_in_safe_mode());
        assert!(PassthroughOp::ClientVersion.allowed_in_safe_mode());
        assert!(!PassthroughOp::ExecuteBatch("VACUUM".into()).allowed_in_safe_mode());
    }
}
