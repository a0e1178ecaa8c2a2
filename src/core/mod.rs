/// Core Module for dbglue
///
/// This module contains the fundamental components of the library: the
/// connection/retry/execute machinery and the shared error types. The
/// marshaling layers (accessors, export, configuration) build on top of it.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbglueError, Result};
