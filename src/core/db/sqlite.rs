/// SQLite Client Backend
///
/// Implementation of the client seam over rusqlite. The session holds the
/// underlying connection behind a mutex in an explicit Connected/Disconnected
/// state, so statements can share it and a closed session fails cleanly
/// instead of faulting. Statements buffer their result rows eagerly on each
/// execution, which gives the connection layer a simple cursor to drain.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rusqlite::types::ValueRef;
use tracing::debug;

use crate::core::db::client::{
    ClientSession, ClientStatement, DbClient, ExecResult, PassthroughOp, Value,
};
use crate::core::db::params::ConnectionKey;
use crate::core::{DbglueError, Result};

/// Client factory for SQLite databases.
///
/// The key's database field is the file path (`:memory:` for an in-memory
/// database). Host, port, user, password and proxy settings are identity
/// fields only; SQLite has no use for them.
#[derive(Debug, Default)]
pub struct SqliteClient;

impl SqliteClient {
    pub fn new() -> Self {
        SqliteClient
    }
}

impl DbClient for SqliteClient {
    fn connect(&self, key: &ConnectionKey) -> Result<Arc<dyn ClientSession>> {
        debug!("opening sqlite database {}", key.database);
        let conn = rusqlite::Connection::open(&key.database)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Arc::new(SqliteSession {
            inner: Arc::new(Mutex::new(SessionInner::Connected(conn))),
        }))
    }
}

/// Internal session state.
#[derive(Debug)]
enum SessionInner {
    Connected(rusqlite::Connection),
    Disconnected,
}

/// One open SQLite database handle, shared with its statements.
#[derive(Debug)]
pub struct SqliteSession {
    inner: Arc<Mutex<SessionInner>>,
}

fn lock_poisoned() -> DbglueError {
    DbglueError::App("database session lock poisoned".to_string())
}

impl ClientSession for SqliteSession {
    fn prepare(&self, sql: &str) -> Result<Arc<dyn ClientStatement>> {
        let guard = self.inner.lock().map_err(|_| lock_poisoned())?;
        match &*guard {
            SessionInner::Connected(conn) => {
                // Validate the statement up front; execution re-prepares via
                // the statement cache.
                conn.prepare_cached(sql)?;
            }
            SessionInner::Disconnected => return Err(DbglueError::NotConnected),
        }
        drop(guard);
        Ok(Arc::new(SqliteStatement {
            inner: Arc::clone(&self.inner),
            sql: sql.to_string(),
            cursor: Mutex::new(Cursor::default()),
        }))
    }

    fn client_op(&self, op: &PassthroughOp) -> Result<Value> {
        let guard = self.inner.lock().map_err(|_| lock_poisoned())?;
        let conn = match &*guard {
            SessionInner::Connected(conn) => conn,
            SessionInner::Disconnected => return Err(DbglueError::NotConnected),
        };
        match op {
            PassthroughOp::LastInsertId => Ok(Value::Integer(conn.last_insert_rowid())),
            PassthroughOp::ChangeCount => Ok(Value::Integer(conn.changes() as i64)),
            PassthroughOp::ClientVersion => Ok(Value::Text(rusqlite::version().to_string())),
            PassthroughOp::ExecuteBatch(sql) => {
                conn.execute_batch(sql)?;
                Ok(Value::Null)
            }
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = SessionInner::Disconnected;
        }
    }
}

/// Buffered result set of the most recent execution.
#[derive(Debug, Default)]
struct Cursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

/// One prepared SQLite statement plus its buffered cursor.
#[derive(Debug)]
pub struct SqliteStatement {
    inner: Arc<Mutex<SessionInner>>,
    sql: String,
    cursor: Mutex<Cursor>,
}

fn from_sqlite(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn to_sqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(t) => rusqlite::types::Value::Text(t.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

impl ClientStatement for SqliteStatement {
    fn run(&self, params: &[Value]) -> Result<ExecResult> {
        let guard = self.inner.lock().map_err(|_| lock_poisoned())?;
        let conn = match &*guard {
            SessionInner::Connected(conn) => conn,
            SessionInner::Disconnected => return Err(DbglueError::NotConnected),
        };

        let mut stmt = conn.prepare_cached(&self.sql)?;
        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite).collect();

        if stmt.column_count() > 0 {
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let column_count = stmt.column_count();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(bound), |row| {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        values.push(from_sqlite(row.get_ref(i)?));
                    }
                    Ok(values)
                })?
                .collect::<std::result::Result<VecDeque<_>, _>>()?;

            let row_count = rows.len();
            let mut cursor = self.cursor.lock().map_err(|_| lock_poisoned())?;
            cursor.columns = columns;
            cursor.rows = rows;
            Ok(ExecResult::Rows(row_count))
        } else {
            let affected = stmt.execute(rusqlite::params_from_iter(bound))?;
            let mut cursor = self.cursor.lock().map_err(|_| lock_poisoned())?;
            cursor.columns.clear();
            cursor.rows.clear();
            Ok(ExecResult::Affected(affected as u64))
        }
    }

    fn columns(&self) -> Vec<String> {
        self.cursor
            .lock()
            .map(|c| c.columns.clone())
            .unwrap_or_default()
    }

    fn fetch_row(&self) -> Option<Vec<Value>> {
        self.cursor.lock().ok()?.rows.pop_front()
    }

    fn row_count(&self) -> usize {
        self.cursor.lock().map(|c| c.rows.len()).unwrap_or(0)
    }
}
