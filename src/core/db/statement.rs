/// Statement Module
///
/// A `Statement` is one prepared query plus the cursor of its most recent
/// execution. Execution always routes through the owning connection's execute
/// primitive so retry and timeout policy apply uniformly whether the caller
/// holds a raw SQL string or a prepared statement.
use std::sync::Arc;

use crate::core::db::client::{ClientStatement, ExecResult, Value};
use crate::core::db::connection::Connection;
use crate::core::Result;

#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    cursor: Arc<dyn ClientStatement>,
    connection_id: u64,
}

impl Statement {
    pub(crate) fn new(sql: &str, cursor: Arc<dyn ClientStatement>, connection_id: u64) -> Self {
        Statement {
            sql: sql.to_string(),
            cursor,
            connection_id,
        }
    }

    /// Source text of the prepared query.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Identifier of the connection that prepared this statement.
    pub(crate) fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub(crate) fn cursor(&self) -> &Arc<dyn ClientStatement> {
        &self.cursor
    }

    /// Executes the statement through its owning connection.
    ///
    /// Delegates verbatim to `Connection::execute_statement`; the statement
    /// itself carries no retry or timeout logic.
    pub fn execute(&self, conn: &mut Connection, params: &[Value]) -> Result<ExecResult> {
        conn.execute_statement(self, params)
    }

    /// Column names of the most recent execution's result set.
    pub fn columns(&self) -> Vec<String> {
        self.cursor.columns()
    }

    /// Pops the next buffered result row, if any.
    pub fn fetch_row(&self) -> Option<Vec<Value>> {
        self.cursor.fetch_row()
    }

    /// Number of rows still buffered in the cursor.
    pub fn row_count(&self) -> usize {
        self.cursor.row_count()
    }
}
