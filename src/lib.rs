// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod accessors;
pub mod config;
pub mod export;
pub mod test_utils;

// Re-export the primary entry points
pub use crate::core::db::client::{ExecResult, PassthroughOp, Value};
pub use crate::core::db::connection::{Connection, ConnectionState};
pub use crate::core::db::params::{ConnectOptions, ConnectionKey};
pub use crate::core::db::registry::{connect, connect_with, ConnectionRegistry};
pub use crate::core::db::statement::Statement;
pub use crate::core::error::{DbglueError, Result};
