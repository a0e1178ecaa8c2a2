/// Result Accessors Module
///
/// Thin shape-converting helpers layered on the connection's execute
/// primitive: single row as mapping, all rows as list of mappings, ordered
/// values, flattened column, single scalar. All of them read from the
/// connection's most recently executed statement, so callers must keep one
/// logical operation in flight per connection.
use std::collections::BTreeMap;

use crate::core::db::client::{PassthroughOp, Value};
use crate::core::db::connection::Connection;
use crate::core::{DbglueError, Result};

impl Connection {
    /// Fetches the next row of the most recent execution as a column-name
    /// to value mapping.
    pub fn fetch_row_map(&self) -> Option<BTreeMap<String, Value>> {
        let stmt = self.last_executed()?;
        let columns = stmt.columns();
        let row = stmt.fetch_row()?;
        Some(columns.into_iter().zip(row).collect())
    }

    /// Fetches the next row of the most recent execution as ordered values.
    pub fn fetch_row_values(&self) -> Option<Vec<Value>> {
        self.last_executed()?.fetch_row()
    }

    /// Number of rows still unfetched from the most recent execution.
    pub fn rows_remaining(&self) -> usize {
        self.last_executed().map(|s| s.row_count()).unwrap_or(0)
    }

    /// Executes a query and returns the first row as a mapping, if any.
    pub fn select_row_map(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<BTreeMap<String, Value>>> {
        self.execute(sql, params)?;
        Ok(self.fetch_row_map())
    }

    /// Executes a query and returns all rows as mappings.
    pub fn select_all_maps(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<BTreeMap<String, Value>>> {
        self.execute(sql, params)?;
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_row_map() {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Executes a query and returns the first row as ordered values, if any.
    pub fn select_row_values(&mut self, sql: &str, params: &[Value]) -> Result<Option<Vec<Value>>> {
        self.execute(sql, params)?;
        Ok(self.fetch_row_values())
    }

    /// Executes a query and returns all rows as ordered-value records.
    pub fn select_all_values(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.execute(sql, params)?;
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_row_values() {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Executes a query and returns every value of every row as one
    /// flattened list, in row-major order.
    pub fn select_col(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        let rows = self.select_all_values(sql, params)?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// Executes a query and returns the first value of the first row.
    pub fn select_scalar(&mut self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let row = self.select_row_values(sql, params)?;
        Ok(row.and_then(|r| r.into_iter().next()))
    }

    /// Row id generated by the most recent successful insert.
    pub fn last_insert_id(&self) -> Result<i64> {
        match self.client_call(&PassthroughOp::LastInsertId)? {
            Value::Integer(id) => Ok(id),
            other => Err(DbglueError::App(format!(
                "client returned non-integer insert id: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::db::params::{resolve, ConnectOptions, NoDefaults};
    use crate::core::db::sqlite::SqliteClient;

    fn connected() -> Connection {
        let opts = ConnectOptions::new(":memory:")
            .user("test")
            .password("")
            .quiet(true)
            .no_abort(true);
        let resolved = resolve(&opts, &NoDefaults, None).unwrap();
        let mut conn = Connection::new(&resolved, Arc::new(SqliteClient::new()));
        conn.connect().unwrap();
        conn.execute(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, a TEXT, b TEXT)",
            &[],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO t (id, a, b) VALUES (5, 'x', 'y'), (6, 'p', 'q')",
            &[],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_prepared_select_shapes() {
        let mut conn = connected();
        let stmt = conn.prepare("SELECT a, b FROM t WHERE id = ?").unwrap();
        stmt.execute(&mut conn, &[Value::Integer(5)]).unwrap();

        // Only the selected columns appear in the mapping.
        let row = conn.fetch_row_map().unwrap();
        assert_eq!(row.get("a"), Some(&Value::Text("x".into())));
        assert_eq!(row.get("b"), Some(&Value::Text("y".into())));
        assert!(!row.contains_key("id"));

        stmt.execute(&mut conn, &[Value::Integer(5)]).unwrap();
        assert_eq!(
            conn.fetch_row_values().unwrap(),
            vec![Value::Text("x".into()), Value::Text("y".into())]
        );
    }

    #[test]
    fn test_select_all_maps() {
        let mut conn = connected();
        let rows = conn
            .select_all_maps("SELECT id, a FROM t ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(5)));
        assert_eq!(rows[1].get("a"), Some(&Value::Text("p".into())));
    }

    #[test]
    fn test_select_col_flattens_rows() {
        let mut conn = connected();
        let values = conn
            .select_col("SELECT a, b FROM t ORDER BY id", &[])
            .unwrap();
        assert_eq!(
            values,
            vec![
                Value::Text("x".into()),
                Value::Text("y".into()),
                Value::Text("p".into()),
                Value::Text("q".into()),
            ]
        );
    }

    #[test]
    fn test_select_scalar() {
        let mut conn = connected();
        assert_eq!(
            conn.select_scalar("SELECT COUNT(*) FROM t", &[]).unwrap(),
            Some(Value::Integer(2))
        );
        assert_eq!(
            conn.select_scalar("SELECT a FROM t WHERE id = 99", &[])
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_last_insert_id() {
        let mut conn = connected();
        conn.execute("INSERT INTO t (a, b) VALUES ('r', 's')", &[])
            .unwrap();
        assert_eq!(conn.last_insert_id().unwrap(), 7);
    }

    #[test]
    fn test_accessors_without_execution() {
        let conn = {
            let opts = ConnectOptions::new(":memory:")
                .user("test")
                .password("")
                .quiet(true)
                .no_abort(true);
            let resolved = resolve(&opts, &NoDefaults, None).unwrap();
            let mut c = Connection::new(&resolved, Arc::new(SqliteClient::new()));
            c.connect().unwrap();
            c
        };
        assert!(conn.fetch_row_map().is_none());
        assert_eq!(conn.rows_remaining(), 0);
    }
}
