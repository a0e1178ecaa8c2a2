/// Retry Policy Module
///
/// This module classifies transient faults and decides whether a failed
/// connect or execute attempt should be retried. Classification is a small
/// ordered list of known substrings matched against the fault text, kept for
/// compatibility with the client library's error reporting.
use std::fmt;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::core::db::{set_service_status, STATUS_OK};

/// Connect faults eligible for automatic retry.
pub const CONNECT_RETRYABLE: &[&str] = &[
    "can't connect",
    "too many connections",
    "database is locked",
];

/// Execute faults eligible for automatic retry.
pub const EXECUTE_RETRYABLE: &[&str] = &[
    "lost connection",
    "server has gone away",
    "server shutdown in progress",
    "database is locked",
];

fn matches_any(patterns: &[&str], text: &str) -> bool {
    let lower = text.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

/// Whether a connect fault matches a known transient-failure pattern.
pub fn is_retryable_connect(error_text: &str) -> bool {
    matches_any(CONNECT_RETRYABLE, error_text)
}

/// Whether an execute fault matches a known transient-failure pattern.
pub fn is_retryable_execute(error_text: &str) -> bool {
    matches_any(EXECUTE_RETRYABLE, error_text)
}

/// Decision strategy consulted after a fault has already been classified
/// retryable. Implementations own their sleeping and bookkeeping, so bounded
/// attempts, exponential backoff or alerting are drop-in replacements.
pub trait RetryPolicy: Send + fmt::Debug {
    /// Returns `true` to permit another attempt. Called once per failed
    /// attempt; implementations typically sleep before returning.
    fn should_retry(&mut self, error_text: &str) -> bool;

    /// Number of attempts in the current outage streak.
    fn attempts(&self) -> u32;

    /// When the current outage streak began, if one is in progress.
    fn down_since(&self) -> Option<DateTime<Local>>;

    /// Ends the current streak. Invoked by the connection's success hook.
    fn reset(&mut self);
}

/// Default policy: sleep a fixed interval and always permit another attempt.
///
/// There is no attempt limit; a downed server blocks the caller until it
/// comes back or the fault stops matching a retryable pattern. Use
/// `BoundedRetryPolicy` where unbounded blocking is inappropriate.
#[derive(Debug)]
pub struct FixedDelayPolicy {
    delay: Duration,
    attempts: u32,
    down_since: Option<DateTime<Local>>,
}

/// Interval slept between attempts by the default policy.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

impl FixedDelayPolicy {
    pub fn new() -> Self {
        FixedDelayPolicy::with_delay(DEFAULT_RETRY_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        FixedDelayPolicy {
            delay,
            attempts: 0,
            down_since: None,
        }
    }

    fn note_attempt(&mut self, error_text: &str) {
        if self.down_since.is_none() {
            let now = Local::now();
            self.down_since = Some(now);
            set_service_status(&format!(
                "down since {}",
                now.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        self.attempts += 1;
        warn!(
            attempts = self.attempts,
            "retrying after transient failure: {}", error_text
        );
    }
}

impl Default for FixedDelayPolicy {
    fn default() -> Self {
        FixedDelayPolicy::new()
    }
}

impl RetryPolicy for FixedDelayPolicy {
    fn should_retry(&mut self, error_text: &str) -> bool {
        self.note_attempt(error_text);
        thread::sleep(self.delay);
        true
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn down_since(&self) -> Option<DateTime<Local>> {
        self.down_since
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.down_since = None;
        set_service_status(STATUS_OK);
    }
}

/// Production-grade variant of the default policy: gives up after a fixed
/// number of attempts instead of blocking forever.
#[derive(Debug)]
pub struct BoundedRetryPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
    down_since: Option<DateTime<Local>>,
}

impl BoundedRetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        BoundedRetryPolicy {
            max_attempts,
            delay,
            attempts: 0,
            down_since: None,
        }
    }
}

impl RetryPolicy for BoundedRetryPolicy {
    fn should_retry(&mut self, error_text: &str) -> bool {
        if self.down_since.is_none() {
            self.down_since = Some(Local::now());
        }
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            warn!(
                attempts = self.attempts - 1,
                "giving up after exhausting retry attempts: {}", error_text
            );
            return false;
        }
        thread::sleep(self.delay);
        true
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn down_since(&self) -> Option<DateTime<Local>> {
        self.down_since
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.down_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_fault_classification() {
        assert!(is_retryable_connect("Can't connect to server on 'db1'"));
        assert!(is_retryable_connect("Too many connections"));
        assert!(is_retryable_connect("database is locked"));
        assert!(!is_retryable_connect("Access denied for user 'app'"));
    }

    #[test]
    fn test_execute_fault_classification() {
        assert!(is_retryable_execute("Lost connection to server during query"));
        assert!(is_retryable_execute("The server has gone away"));
        assert!(is_retryable_execute("Server shutdown in progress"));
        assert!(!is_retryable_execute("no such table: users"));
    }

    #[test]
    fn test_fixed_policy_counts_attempts() {
        let mut policy = FixedDelayPolicy::with_delay(Duration::from_millis(1));
        assert!(policy.should_retry("database is locked"));
        assert!(policy.should_retry("database is locked"));
        assert_eq!(policy.attempts(), 2);
        assert!(policy.down_since().is_some());

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert!(policy.down_since().is_none());
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        let mut policy = BoundedRetryPolicy::new(2, Duration::from_millis(1));
        assert!(policy.should_retry("server has gone away"));
        assert!(policy.should_retry("server has gone away"));
        assert!(!policy.should_retry("server has gone away"));
    }
}
