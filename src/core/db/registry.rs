/// Connection Registry Module
///
/// Process-wide cache mapping canonical connection keys to live connections,
/// enforcing at-most-one non-unique connection per key. The registry is an
/// explicit object so tests can run against their own isolated instance; a
/// default process-wide instance is available via `ConnectionRegistry::global`.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::LocalConfig;
use crate::core::db::client::DbClient;
use crate::core::db::connection::Connection;
use crate::core::db::params::{
    resolve, ConnectOptions, ConnectionKey, DefaultsSource, ReplicaFinder, ResolvedOptions,
};
use crate::core::db::set_last_error;
use crate::core::db::sqlite::SqliteClient;
use crate::core::{DbglueError, Result};

static GLOBAL_REGISTRY: OnceCell<ConnectionRegistry> = OnceCell::new();

/// Registry of cached connections for one client backend.
///
/// Lookup-or-insert runs as one atomic step under the registry lock, so
/// concurrent `get_or_create` calls cannot race a key into two connections.
/// The connections handed out are individually mutex-guarded; callers
/// serialize execute traffic per connection through that lock.
#[derive(Debug)]
pub struct ConnectionRegistry {
    client: Arc<dyn DbClient>,
    connections: Mutex<HashMap<ConnectionKey, Arc<Mutex<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new(client: Arc<dyn DbClient>) -> Self {
        ConnectionRegistry {
            client,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide default registry, backed by the SQLite client.
    pub fn global() -> &'static ConnectionRegistry {
        GLOBAL_REGISTRY.get_or_init(|| ConnectionRegistry::new(Arc::new(SqliteClient::new())))
    }

    /// Returns the cached connection for the resolved key, or constructs one.
    ///
    /// A unique request always constructs a fresh connection and never
    /// consults or populates the cache. A cache hit applies the new request's
    /// verbosity override. A connection that fails to establish is never
    /// inserted.
    ///
    /// Lookup-or-insert is atomic: the registry lock is held across the
    /// connect, so while one key is mid-connect (including its retry sleeps)
    /// `get_or_create` blocks for every other key as well.
    pub fn get_or_create(&self, resolved: &ResolvedOptions) -> Result<Arc<Mutex<Connection>>> {
        if resolved.unique {
            let mut conn = Connection::new(resolved, Arc::clone(&self.client));
            conn.connect()?;
            return Ok(Arc::new(Mutex::new(conn)));
        }

        let mut map = self
            .connections
            .lock()
            .map_err(|_| DbglueError::App("connection registry lock poisoned".to_string()))?;

        if let Some(existing) = map.get(&resolved.key) {
            debug!("reusing cached connection to '{}'", resolved.key.database);
            if let Ok(mut guard) = existing.lock() {
                guard.set_verbose(resolved.verbose);
            }
            return Ok(Arc::clone(existing));
        }

        let mut conn = Connection::new(resolved, Arc::clone(&self.client));
        conn.connect()?;
        let shared = Arc::new(Mutex::new(conn));
        map.insert(resolved.key.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Deletes the cache entry for the key. No-op if absent.
    pub fn remove(&self, key: &ConnectionKey) {
        if let Ok(mut map) = self.connections.lock() {
            map.remove(key);
        }
    }

    /// Closes the cached connection for the key and removes its entry.
    pub fn disconnect(&self, key: &ConnectionKey) {
        if let Ok(mut map) = self.connections.lock() {
            if let Some(shared) = map.remove(key) {
                if let Ok(mut conn) = shared.lock() {
                    conn.disconnect();
                }
            }
        }
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.connections.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes and drops every cached connection.
    pub fn teardown(&self) {
        if let Ok(mut map) = self.connections.lock() {
            for (_, shared) in map.drain() {
                if let Ok(mut conn) = shared.lock() {
                    conn.disconnect();
                }
            }
        }
    }
}

/// Resolves options and returns a (possibly cached) connection from the
/// given registry.
///
/// Resolution failures honor abort-on-error: the message lands in the
/// last-error slot, then either an error is returned (`no_abort`) or the
/// process aborts.
pub fn connect_with(
    registry: &ConnectionRegistry,
    options: &ConnectOptions,
    defaults: &dyn DefaultsSource,
    replica_finder: Option<&dyn ReplicaFinder>,
) -> Result<Arc<Mutex<Connection>>> {
    match resolve(options, defaults, replica_finder) {
        Ok(resolved) => registry.get_or_create(&resolved),
        Err(e) => {
            let message = e.to_string();
            set_last_error(&message);
            if !options.no_abort {
                panic!("dbglue: {}", message);
            }
            Err(e)
        }
    }
}

/// Convenience entry point: resolves against the local configuration file
/// and connects through the process-wide registry.
pub fn connect(options: &ConnectOptions) -> Result<Arc<Mutex<Connection>>> {
    connect_with(
        ConnectionRegistry::global(),
        options,
        LocalConfig::global(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::params::NoDefaults;

    fn memory_options(db: &str) -> ConnectOptions {
        ConnectOptions::new(db)
            .user("test")
            .password("")
            .quiet(true)
            .no_abort(true)
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::new(SqliteClient::new()))
    }

    #[test]
    fn test_same_key_returns_same_connection() {
        let reg = registry();
        let a = connect_with(&reg, &memory_options(":memory:"), &NoDefaults, None).unwrap();
        let b = connect_with(&reg, &memory_options(":memory:"), &NoDefaults, None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_unique_connections_are_never_cached() {
        let reg = registry();
        let opts = memory_options(":memory:").unique(true);
        let a = connect_with(&reg, &opts, &NoDefaults, None).unwrap();
        let b = connect_with(&reg, &opts, &NoDefaults, None).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_disconnect_removes_cache_entry() {
        let reg = registry();
        let a = connect_with(&reg, &memory_options(":memory:"), &NoDefaults, None).unwrap();
        let key = a.lock().unwrap().key().clone();

        reg.disconnect(&key);
        assert!(reg.is_empty());
        assert!(!a.lock().unwrap().is_connected());

        let b = connect_with(&reg, &memory_options(":memory:"), &NoDefaults, None).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_remove_is_noop_for_unknown_key() {
        let reg = registry();
        let a = connect_with(&reg, &memory_options(":memory:"), &NoDefaults, None).unwrap();
        let mut key = a.lock().unwrap().key().clone();
        key.database = "other.db".to_string();

        reg.remove(&key);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_failed_connect_is_never_cached() {
        let reg = registry();
        // A directory path is not a valid SQLite database file.
        let opts = memory_options("/");
        assert!(connect_with(&reg, &opts, &NoDefaults, None).is_err());
        assert!(reg.is_empty());
        assert!(crate::core::db::last_error().is_some());
    }

    #[test]
    #[should_panic(expected = "dbglue:")]
    fn test_resolution_failure_aborts_by_default() {
        let reg = registry();
        let opts = ConnectOptions::default().quiet(true);
        let _ = connect_with(&reg, &opts, &NoDefaults, None);
    }

    #[test]
    fn test_teardown_closes_everything() {
        let reg = registry();
        let a = connect_with(&reg, &memory_options(":memory:"), &NoDefaults, None).unwrap();
        reg.teardown();
        assert!(reg.is_empty());
        assert!(!a.lock().unwrap().is_connected());
    }
}
