/// Database Core Module
///
/// This module contains the connection/retry/execute machinery of dbglue:
/// parameter resolution, the connection registry, the retrying connection
/// state machine, prepared statements, and the client seam the whole stack
/// rides on.
///
/// It also owns two process-readable slots, held in `OnceCell` globals:
/// the last error message recorded by any connection, and a service status
/// label mutated by the retry policy during an outage streak.
use std::sync::Mutex;

use once_cell::sync::OnceCell;

pub mod client;
pub mod connection;
pub mod params;
pub mod registry;
pub mod retry;
pub mod sqlite;
pub mod statement;

/// Service status label used when no outage is in progress.
pub const STATUS_OK: &str = "ok";

static LAST_ERROR: OnceCell<Mutex<Option<String>>> = OnceCell::new();
static SERVICE_STATUS: OnceCell<Mutex<String>> = OnceCell::new();

/// Records a message in the process-readable last-error slot.
pub fn set_last_error(message: &str) {
    let slot = LAST_ERROR.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(message.to_string());
    }
}

/// Returns the most recently recorded error message, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.get()?.lock().ok()?.clone()
}

/// Mutates the process-visible service status label.
pub fn set_service_status(status: &str) {
    let slot = SERVICE_STATUS.get_or_init(|| Mutex::new(STATUS_OK.to_string()));
    if let Ok(mut guard) = slot.lock() {
        *guard = status.to_string();
    }
}

/// Returns the current service status label.
pub fn service_status() -> String {
    SERVICE_STATUS
        .get_or_init(|| Mutex::new(STATUS_OK.to_string()))
        .lock()
        .map(|g| g.clone())
        .unwrap_or_else(|_| STATUS_OK.to_string())
}
