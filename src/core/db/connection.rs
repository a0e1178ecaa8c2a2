/// Connection Module
///
/// This module implements the retrying connection state machine at the heart
/// of dbglue. A `Connection` owns one underlying client session and funnels
/// every connect and execute attempt through the same timeout and retry
/// handling, tracking the most recently prepared and most recently executed
/// statements for the result-accessor layer.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::db::client::{ClientSession, DbClient, ExecResult, PassthroughOp, Value};
use crate::core::db::params::{ConnectionKey, ResolvedOptions};
use crate::core::db::retry::{is_retryable_connect, is_retryable_execute, RetryPolicy};
use crate::core::db::set_last_error;
use crate::core::db::statement::Statement;
use crate::core::{DbglueError, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// One live session to the database server, with retrying connect/execute.
///
/// A connection is single-threaded by design: execute calls are strictly
/// sequential, and "most recently executed statement" is only well-defined
/// under that discipline. The registry hands out `Arc<Mutex<Connection>>` so
/// multi-threaded callers serialize externally.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    key: ConnectionKey,
    client: Arc<dyn DbClient>,
    session: Option<Arc<dyn ClientSession>>,
    state: ConnectionState,
    quiet: bool,
    verbose: bool,
    retry_enabled: bool,
    no_abort: bool,
    safe_mode: bool,
    timeout: Option<Duration>,
    retry_count: u32,
    retry_start: Option<Instant>,
    policy: Box<dyn RetryPolicy>,
    last_prepared: Option<Statement>,
    last_executed: Option<Statement>,
}

impl Connection {
    /// Creates a disconnected connection with the default retry policy.
    pub fn new(resolved: &ResolvedOptions, client: Arc<dyn DbClient>) -> Self {
        Connection::with_policy(
            resolved,
            client,
            Box::new(crate::core::db::retry::FixedDelayPolicy::new()),
        )
    }

    /// Creates a disconnected connection with a caller-supplied retry policy.
    pub fn with_policy(
        resolved: &ResolvedOptions,
        client: Arc<dyn DbClient>,
        policy: Box<dyn RetryPolicy>,
    ) -> Self {
        Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            key: resolved.key.clone(),
            client,
            session: None,
            state: ConnectionState::Disconnected,
            quiet: resolved.quiet,
            verbose: resolved.verbose,
            retry_enabled: resolved.retry_enabled,
            no_abort: resolved.no_abort,
            safe_mode: true,
            timeout: resolved.timeout,
            retry_count: 0,
            retry_start: None,
            policy,
            last_prepared: None,
            last_executed: None,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.session.is_some()
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Safe mode restricts passthrough calls to the allow-listed subset.
    /// Enabled by default.
    pub fn set_safe_mode(&mut self, safe_mode: bool) {
        self.safe_mode = safe_mode;
    }

    pub fn replace_policy(&mut self, policy: Box<dyn RetryPolicy>) {
        self.policy = policy;
    }

    /// Establishes the underlying client session.
    ///
    /// Retryable connect faults loop while retry is enabled and the policy
    /// permits. A configured timeout pre-empts retry: the attempt is
    /// abandoned and a `Timeout` error returned without consulting the
    /// policy. Non-retryable failures move the connection to `Failed` and
    /// either return an error or abort the process, per the abort-on-error
    /// flag chosen at connect time.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;
        debug!("connecting to '{}'", self.key.database);

        loop {
            let client = Arc::clone(&self.client);
            let key = self.key.clone();
            let attempt = run_with_timeout(self.timeout, "connect", move || client.connect(&key));

            match attempt {
                Ok(session) => {
                    self.session = Some(session);
                    self.state = ConnectionState::Connected;
                    self.note_success();
                    return Ok(());
                }
                Err(DbglueError::Timeout(msg)) => {
                    self.state = ConnectionState::Failed;
                    set_last_error(&msg);
                    self.report(&msg);
                    return Err(DbglueError::Timeout(msg));
                }
                Err(e) => {
                    let text = e.to_string();
                    if self.retry_enabled
                        && is_retryable_connect(&text)
                        && self.policy.should_retry(&text)
                    {
                        self.note_retry();
                        continue;
                    }

                    self.state = ConnectionState::Failed;
                    let message =
                        format!("connect to '{}' failed: {}", self.key.database, text);
                    set_last_error(&message);
                    self.report(&message);
                    if !self.no_abort {
                        panic!("dbglue: {}", message);
                    }
                    return Err(DbglueError::Connection(message));
                }
            }
        }
    }

    /// Closes the underlying client session.
    ///
    /// Any statements prepared on this connection become unusable; the
    /// registry entry, if one exists, is removed by the caller.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.state = ConnectionState::Disconnected;
        self.last_prepared = None;
        self.last_executed = None;
    }

    /// Prepares a statement and records it as most recently prepared.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        let session = self.session_or_not_connected()?;
        let cursor = session.prepare(sql)?;
        let stmt = Statement::new(sql, cursor, self.id);
        self.last_prepared = Some(stmt.clone());
        Ok(stmt)
    }

    /// Prepares and executes a raw SQL string in one call.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let stmt = self.prepare(sql)?;
        self.execute_statement(&stmt, params)
    }

    /// Executes a prepared statement with the shared retry/timeout handling.
    ///
    /// The single execute primitive: both raw SQL calls and
    /// `Statement::execute` end up here. Retryable faults re-issue the
    /// execute against the same prepared cursor without reconnecting; the
    /// client library is assumed to reestablish its own transport if needed.
    /// Per-query failures always return an error, never abort.
    pub fn execute_statement(&mut self, stmt: &Statement, params: &[Value]) -> Result<ExecResult> {
        if stmt.connection_id() != self.id {
            return Err(DbglueError::Execution(
                "statement was prepared on a different connection".to_string(),
            ));
        }
        self.session_or_not_connected()?;

        if self.verbose {
            info!(sql = stmt.sql(), "executing");
        }

        loop {
            let cursor = Arc::clone(stmt.cursor());
            let bound = params.to_vec();
            let attempt =
                run_with_timeout(self.timeout, "execute", move || cursor.run(&bound));

            match attempt {
                Ok(result) => {
                    self.last_executed = Some(stmt.clone());
                    self.note_success();
                    return Ok(result);
                }
                Err(DbglueError::Timeout(msg)) => {
                    set_last_error(&msg);
                    self.report(&msg);
                    return Err(DbglueError::Timeout(msg));
                }
                Err(e) => {
                    let text = e.to_string();
                    if self.retry_enabled
                        && is_retryable_execute(&text)
                        && self.policy.should_retry(&text)
                    {
                        self.note_retry();
                        continue;
                    }

                    set_last_error(&text);
                    self.report(&format!("query failed: {}", text));
                    return Err(e);
                }
            }
        }
    }

    /// The statement whose execution the result accessors read from.
    pub fn last_executed(&self) -> Option<&Statement> {
        self.last_executed.as_ref()
    }

    /// The most recently prepared statement.
    pub fn last_prepared(&self) -> Option<&Statement> {
        self.last_prepared.as_ref()
    }

    /// Forwards an allow-listed operation to the underlying client.
    ///
    /// With safe mode enabled (the default), operations outside the safe
    /// subset are rejected.
    pub fn client_call(&self, op: &PassthroughOp) -> Result<Value> {
        if self.safe_mode && !op.allowed_in_safe_mode() {
            return Err(DbglueError::Execution(format!(
                "passthrough operation {:?} is not permitted in safe mode",
                op
            )));
        }
        let session = self.session_or_not_connected()?;
        session.client_op(op)
    }

    fn session_or_not_connected(&self) -> Result<Arc<dyn ClientSession>> {
        match (&self.state, &self.session) {
            (ConnectionState::Connected, Some(session)) => Ok(Arc::clone(session)),
            _ => {
                self.report("not connected to a database");
                Err(DbglueError::NotConnected)
            }
        }
    }

    fn note_retry(&mut self) {
        self.retry_count += 1;
        if self.retry_start.is_none() {
            self.retry_start = Some(Instant::now());
        }
    }

    /// Operation-successful hook: resets retry bookkeeping and announces
    /// recovery if this success ended a retry streak.
    fn note_success(&mut self) {
        if self.retry_count > 0 {
            let downtime = self
                .retry_start
                .map(|t| format!(" ({:.1}s of downtime)", t.elapsed().as_secs_f64()))
                .unwrap_or_default();
            let notice = format!(
                "service restored after {} retries{}",
                self.retry_count, downtime
            );
            info!("{}", notice);
            if !self.quiet {
                eprintln!("dbglue: {}", notice);
            }
        }
        self.retry_count = 0;
        self.retry_start = None;
        self.policy.reset();
    }

    /// Quiet-gated warning: always traced, printed to stderr unless quiet.
    fn report(&self, message: &str) {
        warn!("{}", message);
        if !self.quiet {
            eprintln!("dbglue: {}", message);
        }
    }
}

/// Runs a blocking client call, optionally bounded by a wall-clock timeout.
///
/// The call is moved onto a helper thread and awaited over a channel; if the
/// deadline elapses the attempt is abandoned and the thread left to finish on
/// its own. The underlying in-flight call is not torn down, matching the
/// behavior this layer is modeled on.
fn run_with_timeout<T, F>(timeout: Option<Duration>, what: &str, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(limit) = timeout else {
        return op();
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(op());
    });

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(_) => Err(DbglueError::Timeout(format!(
            "{} timed out after {:.3}s",
            what,
            limit.as_secs_f64()
        ))),
    }
}
