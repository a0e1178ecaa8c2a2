//! Integration tests for the retry and timeout behavior of the connection
//! core, driven by the scripted mock client so no real outage is needed.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dbglue::core::db::connection::Connection;
use dbglue::test_utils::{
    test_resolved, test_resolved_with_timeout, CountingPolicy, MockClient,
};
use dbglue::{ConnectionState, DbglueError, Value};

#[test]
fn retryable_execute_fault_consults_policy_then_succeeds() {
    let client = Arc::new(MockClient::new());
    client.set_result(&["n"], vec![vec![Value::Integer(1)]]);
    let (policy, calls) = CountingPolicy::new(true);
    let mut conn = Connection::with_policy(&test_resolved("mockdb"), client.clone(), policy);
    conn.connect().unwrap();

    client.fail_executes(&[
        "The server has gone away",
        "Lost connection to server during query",
    ]);
    let stmt = conn.prepare("SELECT n FROM t").unwrap();
    stmt.execute(&mut conn, &[]).unwrap();

    // Two transient faults, one consultation each, success on the third try.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.execute_calls(), 3);
    assert_eq!(conn.fetch_row_values().unwrap(), vec![Value::Integer(1)]);
}

#[test]
fn retry_disabled_fails_immediately_without_policy() {
    let client = Arc::new(MockClient::new());
    let (policy, calls) = CountingPolicy::new(true);
    let mut resolved = test_resolved("mockdb");
    resolved.retry_enabled = false;
    let mut conn = Connection::with_policy(&resolved, client.clone(), policy);
    conn.connect().unwrap();

    client.fail_executes(&["The server has gone away"]);
    let err = conn.execute("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, DbglueError::Execution(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(client.execute_calls(), 1);
}

#[test]
fn non_retryable_execute_fault_skips_policy() {
    let client = Arc::new(MockClient::new());
    let (policy, calls) = CountingPolicy::new(true);
    let mut conn = Connection::with_policy(&test_resolved("mockdb"), client.clone(), policy);
    conn.connect().unwrap();

    client.fail_executes(&["no such table: users"]);
    let err = conn.execute("SELECT * FROM users", &[]).unwrap_err();
    assert!(matches!(err, DbglueError::Execution(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn declining_policy_stops_the_retry_loop() {
    let client = Arc::new(MockClient::new());
    let (policy, calls) = CountingPolicy::new(false);
    let mut conn = Connection::with_policy(&test_resolved("mockdb"), client.clone(), policy);
    conn.connect().unwrap();

    client.fail_executes(&["The server has gone away"]);
    assert!(conn.execute("SELECT 1", &[]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.execute_calls(), 1);
}

#[test]
fn retryable_connect_fault_loops_until_success() {
    let client = Arc::new(MockClient::new());
    let (policy, calls) = CountingPolicy::new(true);
    let mut conn = Connection::with_policy(&test_resolved("mockdb"), client.clone(), policy);

    client.fail_connects(&["Can't connect to server on 'db1'", "Too many connections"]);
    conn.connect().unwrap();

    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.connect_calls(), 3);
}

#[test]
fn non_retryable_connect_fault_fails_the_connection() {
    let client = Arc::new(MockClient::new());
    client.fail_connects(&["Access denied for user 'app'"]);
    let (policy, calls) = CountingPolicy::new(true);
    let mut conn = Connection::with_policy(&test_resolved("mockdb"), client, policy);

    let err = conn.connect().unwrap_err();
    assert!(matches!(err, DbglueError::Connection(_)));
    assert_eq!(conn.state(), ConnectionState::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
#[should_panic(expected = "dbglue:")]
fn connect_failure_aborts_unless_no_abort() {
    let client = Arc::new(MockClient::new());
    client.fail_connects(&["Access denied for user 'app'"]);
    let (policy, _calls) = CountingPolicy::new(true);
    let mut resolved = test_resolved("mockdb");
    resolved.no_abort = false;
    let mut conn = Connection::with_policy(&resolved, client, policy);
    let _ = conn.connect();
}

#[test]
fn connect_timeout_preempts_retry() {
    let client = Arc::new(MockClient::new());
    client.set_connect_delay(Duration::from_millis(300));
    // Even a retryable fault behind the stall must not reach the policy.
    client.fail_connects(&["Can't connect to server on 'db1'"]);
    let (policy, calls) = CountingPolicy::new(true);
    let mut conn = Connection::with_policy(
        &test_resolved_with_timeout("mockdb", 0.05),
        client,
        policy,
    );

    let err = conn.connect().unwrap_err();
    assert!(matches!(err, DbglueError::Timeout(_)));
    assert_eq!(conn.state(), ConnectionState::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(dbglue::core::db::last_error()
        .map(|m| m.contains("timed out"))
        .unwrap_or(false));
}

#[test]
fn execute_timeout_preempts_retry() {
    let client = Arc::new(MockClient::new());
    let (policy, calls) = CountingPolicy::new(true);
    let mut conn = Connection::with_policy(
        &test_resolved_with_timeout("mockdb", 0.05),
        client.clone(),
        policy,
    );
    conn.connect().unwrap();

    client.set_execute_delay(Duration::from_millis(300));
    let err = conn.execute("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, DbglueError::Timeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
