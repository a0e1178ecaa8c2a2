use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::debug;

use crate::core::db::params::{ConnectOptions, DefaultsSource};
use crate::core::{DbglueError, Result};

static GLOBAL_CONFIG: OnceCell<LocalConfig> = OnceCell::new();

/// Top-level local configuration parsed from a TOML file.
///
/// The `[defaults]` section supplies per-field fallbacks used when neither
/// the caller nor a profile provides a value; `[profiles.<name>]` sections
/// are complete named parameter sets merged in first when requested.
#[derive(Debug, Deserialize, Default)]
pub struct LocalConfig {
    pub defaults: Option<ProfileConfig>,
    pub profiles: Option<HashMap<String, ProfileConfig>>,
}

/// One set of connection parameters from the configuration file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProfileConfig {
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl LocalConfig {
    /// Loads configuration from a TOML file at the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LocalConfig> {
        let content = fs::read_to_string(path)?;
        LocalConfig::parse_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<LocalConfig> {
        toml::from_str(content).map_err(|e| DbglueError::Config(e.to_string()))
    }

    /// Default configuration file location under the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dbglue").join("config.toml"))
    }

    /// The process-wide configuration, loaded once from the default path.
    /// Missing or unreadable files yield an empty configuration.
    pub fn global() -> &'static LocalConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            LocalConfig::default_path()
                .filter(|p| p.exists())
                .and_then(|p| match LocalConfig::load(&p) {
                    Ok(config) => {
                        debug!("loaded configuration from {:?}", p);
                        Some(config)
                    }
                    Err(_) => None,
                })
                .unwrap_or_default()
        })
    }

    fn defaults(&self) -> Option<&ProfileConfig> {
        self.defaults.as_ref()
    }
}

impl DefaultsSource for LocalConfig {
    fn profile_options(&self, name: &str) -> Option<ConnectOptions> {
        let profile = self.profiles.as_ref()?.get(name)?;
        Some(ConnectOptions {
            database: profile.database.clone(),
            user: profile.user.clone(),
            password: profile.password.clone(),
            host: profile.host.clone(),
            port: profile.port,
            ..ConnectOptions::default()
        })
    }

    fn default_db(&self, _profile: Option<&str>) -> Option<String> {
        self.defaults()?.database.clone()
    }

    fn default_user(&self, _profile: Option<&str>) -> Option<String> {
        self.defaults()?.user.clone()
    }

    fn default_pass(&self, _profile: Option<&str>) -> Option<String> {
        self.defaults()?.password.clone()
    }

    fn default_host(&self, _profile: Option<&str>) -> Option<String> {
        self.defaults()?.host.clone()
    }

    fn default_port(&self, _profile: Option<&str>) -> Option<u16> {
        self.defaults()?.port
    }
}
