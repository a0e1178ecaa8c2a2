/// # Test Utilities Module
///
/// Testing infrastructure for dbglue: a scripted mock client that can fail
/// connects and executes with chosen fault texts or stall long enough to
/// trip timeouts, and a retry policy that records how often it was
/// consulted. Both plug into the same seams production code uses, so the
/// retry/timeout paths are exercised without a real outage.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::core::db::client::{
    ClientSession, ClientStatement, DbClient, ExecResult, PassthroughOp, Value,
};
use crate::core::db::params::{resolve, ConnectOptions, ConnectionKey, NoDefaults, ResolvedOptions};
use crate::core::db::retry::RetryPolicy;
use crate::core::{DbglueError, Result};

/// Scripted state shared between a mock client and its sessions.
#[derive(Debug, Default)]
struct MockScript {
    connect_failures: Mutex<VecDeque<String>>,
    execute_failures: Mutex<VecDeque<String>>,
    connect_delay: Mutex<Option<Duration>>,
    execute_delay: Mutex<Option<Duration>>,
    columns: Mutex<Vec<String>>,
    rows: Mutex<Vec<Vec<Value>>>,
    connect_calls: AtomicU32,
    execute_calls: AtomicU32,
}

/// Mock database client with scripted faults, delays, and result rows.
#[derive(Debug, Default)]
pub struct MockClient {
    script: Arc<MockScript>,
}

impl MockClient {
    pub fn new() -> Self {
        MockClient::default()
    }

    /// Queues connect attempts to fail, in order, with the given fault texts.
    pub fn fail_connects(&self, messages: &[&str]) {
        let mut queue = self.script.connect_failures.lock().unwrap();
        queue.extend(messages.iter().map(|m| m.to_string()));
    }

    /// Queues execute attempts to fail, in order, with the given fault texts.
    pub fn fail_executes(&self, messages: &[&str]) {
        let mut queue = self.script.execute_failures.lock().unwrap();
        queue.extend(messages.iter().map(|m| m.to_string()));
    }

    /// Makes every connect attempt sleep this long before returning.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.script.connect_delay.lock().unwrap() = Some(delay);
    }

    /// Makes every execute attempt sleep this long before returning.
    pub fn set_execute_delay(&self, delay: Duration) {
        *self.script.execute_delay.lock().unwrap() = Some(delay);
    }

    /// Sets the result set every successful query execution returns.
    pub fn set_result(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        *self.script.columns.lock().unwrap() = columns.iter().map(|c| c.to_string()).collect();
        *self.script.rows.lock().unwrap() = rows;
    }

    pub fn connect_calls(&self) -> u32 {
        self.script.connect_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u32 {
        self.script.execute_calls.load(Ordering::SeqCst)
    }
}

impl DbClient for MockClient {
    fn connect(&self, _key: &ConnectionKey) -> Result<Arc<dyn ClientSession>> {
        self.script.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = *self.script.connect_delay.lock().unwrap() {
            thread::sleep(delay);
        }
        if let Some(message) = self.script.connect_failures.lock().unwrap().pop_front() {
            return Err(DbglueError::Connection(message));
        }
        Ok(Arc::new(MockSession {
            script: Arc::clone(&self.script),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct MockSession {
    script: Arc<MockScript>,
    closed: AtomicBool,
}

impl ClientSession for MockSession {
    fn prepare(&self, sql: &str) -> Result<Arc<dyn ClientStatement>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbglueError::NotConnected);
        }
        Ok(Arc::new(MockStatement {
            script: Arc::clone(&self.script),
            sql: sql.to_string(),
            cursor: Mutex::new(VecDeque::new()),
        }))
    }

    fn client_op(&self, op: &PassthroughOp) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbglueError::NotConnected);
        }
        match op {
            PassthroughOp::LastInsertId => Ok(Value::Integer(1)),
            PassthroughOp::ChangeCount => Ok(Value::Integer(0)),
            PassthroughOp::ClientVersion => Ok(Value::Text("mock-client".to_string())),
            PassthroughOp::ExecuteBatch(_) => Ok(Value::Null),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct MockStatement {
    script: Arc<MockScript>,
    #[allow(dead_code)]
    sql: String,
    cursor: Mutex<VecDeque<Vec<Value>>>,
}

impl ClientStatement for MockStatement {
    fn run(&self, _params: &[Value]) -> Result<ExecResult> {
        self.script.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = *self.script.execute_delay.lock().unwrap() {
            thread::sleep(delay);
        }
        if let Some(message) = self.script.execute_failures.lock().unwrap().pop_front() {
            return Err(DbglueError::Execution(message));
        }
        let rows = self.script.rows.lock().unwrap().clone();
        if self.script.columns.lock().unwrap().is_empty() {
            Ok(ExecResult::Affected(1))
        } else {
            let mut cursor = self.cursor.lock().unwrap();
            *cursor = rows.into();
            Ok(ExecResult::Rows(cursor.len()))
        }
    }

    fn columns(&self) -> Vec<String> {
        self.script.columns.lock().unwrap().clone()
    }

    fn fetch_row(&self) -> Option<Vec<Value>> {
        self.cursor.lock().ok()?.pop_front()
    }

    fn row_count(&self) -> usize {
        self.cursor.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Retry policy that records every consultation and answers with a fixed
/// decision, without sleeping.
#[derive(Debug)]
pub struct CountingPolicy {
    calls: Arc<AtomicU32>,
    decision: bool,
}

impl CountingPolicy {
    /// Returns the policy and a shared handle to its consultation counter.
    pub fn new(decision: bool) -> (Box<CountingPolicy>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Box::new(CountingPolicy {
                calls: Arc::clone(&calls),
                decision,
            }),
            calls,
        )
    }
}

impl RetryPolicy for CountingPolicy {
    fn should_retry(&mut self, _error_text: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decision
    }

    fn attempts(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn down_since(&self) -> Option<DateTime<Local>> {
        None
    }

    fn reset(&mut self) {}
}

/// Resolved options for a quiet, non-aborting test connection.
pub fn test_resolved(database: &str) -> ResolvedOptions {
    let opts = ConnectOptions::new(database)
        .user("test")
        .password("")
        .quiet(true)
        .no_abort(true);
    resolve(&opts, &NoDefaults, None).expect("test options should resolve")
}

/// Like `test_resolved`, with a connect/execute timeout in seconds.
pub fn test_resolved_with_timeout(database: &str, timeout: f64) -> ResolvedOptions {
    let opts = ConnectOptions::new(database)
        .user("test")
        .password("")
        .quiet(true)
        .no_abort(true)
        .timeout(timeout);
    resolve(&opts, &NoDefaults, None).expect("test options should resolve")
}
