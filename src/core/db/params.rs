/// Parameter Resolution Module
///
/// This module merges explicit call-site connection options with profile and
/// per-field defaults into a canonical, validated connection key plus the
/// behavioral flags the connection layer needs (retry, quiet, verbose, unique,
/// abort-on-error, timeout).
use std::time::Duration;

use tracing::warn;

use crate::core::{DbglueError, Result};

/// Environment flag that makes new connections quiet by default, intended for
/// planned outage windows.
pub const OUTAGE_ENV: &str = "DBGLUE_OUTAGE";

/// Environment flag that makes new connections verbose by default.
pub const DEBUG_ENV: &str = "DBGLUE_DEBUG";

/// Host value that explicitly requests a local/socket connection.
const LOCAL_HOST_SENTINEL: &str = "none";

/// Proxy routing settings, part of the connection key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProxySettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub key: Option<String>,
    pub cipher: Option<String>,
}

impl ProxySettings {
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.key.is_none() && self.cipher.is_none()
    }
}

/// Canonical tuple identifying a reusable connection.
///
/// Two keys are equal iff all fields match. An empty host means a local
/// (socket) connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub database: String,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub proxy: ProxySettings,
}

/// Caller-supplied connection options, prior to resolution.
///
/// All identity fields are optional here; resolution fills them from a named
/// profile and the defaults source, then validates the result.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Named configuration profile to merge first, if any.
    pub profile: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    /// May legitimately be empty, but must be present after resolution.
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: ProxySettings,
    /// Never consult or populate the connection cache.
    pub unique: bool,
    /// Suppress user-visible warnings.
    pub quiet: bool,
    /// Log every statement as it is executed.
    pub verbose: bool,
    /// Disable the automatic retry loop.
    pub no_retry: bool,
    /// Return errors instead of aborting on connect/resolution failure.
    pub no_abort: bool,
    /// Wall-clock timeout for connect and execute, in fractional seconds.
    /// `None` or zero disables the timeout.
    pub timeout: Option<f64>,
    /// Route to a read-only replica discovered via a `ReplicaFinder`.
    pub use_replica: bool,
}

impl ConnectOptions {
    pub fn new(database: impl Into<String>) -> Self {
        ConnectOptions {
            database: Some(database.into()),
            ..ConnectOptions::default()
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn no_retry(mut self, no_retry: bool) -> Self {
        self.no_retry = no_retry;
        self
    }

    pub fn no_abort(mut self, no_abort: bool) -> Self {
        self.no_abort = no_abort;
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn use_replica(mut self, use_replica: bool) -> Self {
        self.use_replica = use_replica;
        self
    }

    /// Fills any unset identity fields from `fallback`, keeping explicit
    /// values. Behavioral flags are not merged; they belong to the call site.
    fn merged_over(mut self, fallback: &ConnectOptions) -> Self {
        self.database = self.database.or_else(|| fallback.database.clone());
        self.user = self.user.or_else(|| fallback.user.clone());
        self.password = self.password.or_else(|| fallback.password.clone());
        self.host = self.host.or_else(|| fallback.host.clone());
        self.port = self.port.or(fallback.port);
        if self.proxy.is_empty() {
            self.proxy = fallback.proxy.clone();
        }
        self
    }
}

/// Per-field default lookups, typically backed by the local configuration
/// file. Every lookup receives the profile name the caller asked for, if any.
pub trait DefaultsSource {
    /// Full option set for a named profile, or `None` if unknown.
    fn profile_options(&self, name: &str) -> Option<ConnectOptions>;

    fn default_db(&self, profile: Option<&str>) -> Option<String>;
    fn default_user(&self, profile: Option<&str>) -> Option<String>;
    fn default_pass(&self, profile: Option<&str>) -> Option<String>;
    fn default_host(&self, profile: Option<&str>) -> Option<String>;
    fn default_port(&self, profile: Option<&str>) -> Option<u16>;
}

/// A defaults source with no defaults at all.
#[derive(Debug, Default)]
pub struct NoDefaults;

impl DefaultsSource for NoDefaults {
    fn profile_options(&self, _name: &str) -> Option<ConnectOptions> {
        None
    }

    fn default_db(&self, _profile: Option<&str>) -> Option<String> {
        None
    }

    fn default_user(&self, _profile: Option<&str>) -> Option<String> {
        None
    }

    fn default_pass(&self, _profile: Option<&str>) -> Option<String> {
        None
    }

    fn default_host(&self, _profile: Option<&str>) -> Option<String> {
        None
    }

    fn default_port(&self, _profile: Option<&str>) -> Option<u16> {
        None
    }
}

/// Discovers a read-only replica for a `use_replica` request.
///
/// Returning an error is non-fatal: resolution warns and proceeds with the
/// primary parameters.
pub trait ReplicaFinder {
    fn find_replica(&self, options: &ConnectOptions) -> Result<ConnectOptions>;
}

/// Fully resolved connection request: canonical key plus behavioral flags.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub key: ConnectionKey,
    pub unique: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub retry_enabled: bool,
    pub no_abort: bool,
    pub timeout: Option<Duration>,
}

/// Resolves caller options against a defaults source into a validated
/// connection key and behavioral flags.
///
/// # Errors
///
/// Returns `DbglueError::Config` if the database name, user, or password is
/// still absent after profile and default merging. An empty password is
/// accepted; an absent one is not.
pub fn resolve(
    options: &ConnectOptions,
    defaults: &dyn DefaultsSource,
    replica_finder: Option<&dyn ReplicaFinder>,
) -> Result<ResolvedOptions> {
    let profile = options.profile.as_deref();

    let mut merged = options.clone();
    if let Some(name) = profile {
        match defaults.profile_options(name) {
            Some(profile_opts) => merged = merged.merged_over(&profile_opts),
            None => {
                return Err(DbglueError::Config(format!(
                    "unknown configuration profile '{}'",
                    name
                )))
            }
        }
    }

    if merged.use_replica {
        match replica_finder {
            Some(finder) => match finder.find_replica(&merged) {
                Ok(replica_opts) => merged = replica_opts,
                Err(e) => {
                    warn!("replica discovery failed, using primary: {}", e);
                }
            },
            None => {
                warn!("replica requested but no replica finder is available, using primary");
            }
        }
    }

    let database = merged
        .database
        .clone()
        .or_else(|| defaults.default_db(profile))
        .ok_or_else(|| DbglueError::Config("no database name given".to_string()))?;

    let user = merged
        .user
        .clone()
        .or_else(|| defaults.default_user(profile))
        .ok_or_else(|| DbglueError::Config(format!("no user given for database '{}'", database)))?;

    let password = merged
        .password
        .clone()
        .or_else(|| defaults.default_pass(profile))
        .ok_or_else(|| {
            DbglueError::Config(format!("no password given for database '{}'", database))
        })?;

    let host = match merged.host.clone().or_else(|| defaults.default_host(profile)) {
        Some(h) if h == LOCAL_HOST_SENTINEL => String::new(),
        Some(h) => h,
        None => String::new(),
    };

    let port = merged.port.or_else(|| defaults.default_port(profile));

    let quiet = merged.quiet || std::env::var_os(OUTAGE_ENV).is_some();
    let verbose = merged.verbose || std::env::var_os(DEBUG_ENV).is_some();

    let timeout = match merged.timeout {
        Some(secs) if secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        _ => None,
    };

    Ok(ResolvedOptions {
        key: ConnectionKey {
            database,
            host,
            port,
            user,
            password,
            proxy: merged.proxy.clone(),
        },
        unique: merged.unique,
        quiet,
        verbose,
        retry_enabled: !merged.no_retry,
        no_abort: merged.no_abort,
        timeout,
    })
}
