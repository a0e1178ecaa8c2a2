/// dbglue Error Module
///
/// This module defines the error types used across the dbglue library.
/// It provides structured error handling with proper error propagation and
/// user-friendly error messages.
use thiserror::Error;

/// Comprehensive error type for the dbglue library.
///
/// This enum covers all error scenarios that can occur within dbglue:
/// - Configuration resolution (missing required parameters)
/// - Connection establishment and loss
/// - Connect/execute timeouts
/// - Query execution faults
/// - Underlying client library errors
#[derive(Error, Debug)]
pub enum DbglueError {
    /// Configuration errors (missing database, user or password, bad profile)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection establishment errors (non-retryable, or retry declined)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A connect or execute call exceeded the configured wall-clock timeout
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Query execution faults not matching the retryable patterns
    #[error("Execution error: {0}")]
    Execution(String),

    /// An operation was attempted on a disconnected handle
    #[error("Not connected to a database")]
    NotConnected,

    /// Errors surfaced directly by the underlying SQLite client
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON conversion errors from the export layer
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic application errors for unexpected conditions
    #[error("Application error: {0}")]
    App(String),
}

/// Type alias for Result to use DbglueError as the error type.
///
/// This provides a consistent error type across the entire library
/// instead of using `Result<T, String>` or mixed error types.
pub type Result<T> = std::result::Result<T, DbglueError>;
