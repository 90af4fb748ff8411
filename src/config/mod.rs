//! config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order; the first existing file wins:
//! 1. An explicit path (`fw --config PATH`)
//! 2. `$FORGEWORK_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/forgework/config.toml`
//! 4. `~/.forgework/config.toml`
//!
//! A missing file is not an error; the configuration is then empty. An
//! explicit path that does not exist is an error. `fw` passes a set
//! `$FORGEWORK_CONFIG` as an explicit path.
//!
//! # Example
//!
//! ```no_run
//! use forgework::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! for (key, entry) in config.services() {
//!     println!("{} ({:?})", key, entry.kind);
//! }
//! ```

pub mod schema;

pub use schema::{ForgeworkConfig, ServiceEntry};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FORGEWORK_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("no service given and no default_service configured")]
    NoDefaultService,
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: ForgeworkConfig,
    /// Path the configuration was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or is
    /// invalid, or if `explicit` does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::locate(),
        };

        let Some(path) = path else {
            debug!("no config file found");
            return Ok(Config::default());
        };

        debug!(path = %path.display(), "loading config");
        let file = Self::read(&path)?;
        file.validate()?;

        Ok(Config {
            file,
            path: Some(path),
        })
    }

    /// First existing file among the default locations.
    fn locate() -> Option<PathBuf> {
        // 1. Check $FORGEWORK_CONFIG
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/forgework/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("forgework/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.forgework/config.toml
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".forgework/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Read and parse a config file.
    pub fn read(path: &Path) -> Result<ForgeworkConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Path the configuration was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configured services by key.
    pub fn services(&self) -> &BTreeMap<String, ServiceEntry> {
        &self.file.services
    }

    /// Key of the default service.
    pub fn default_service(&self) -> Option<&str> {
        self.file.default_service.as_deref()
    }

    /// The service named `key`, or the default service.
    ///
    /// # Errors
    ///
    /// - `UnknownService` if `key` is not configured
    /// - `NoDefaultService` if `key` is `None` and no default is set
    pub fn service(&self, key: Option<&str>) -> Result<(&str, &ServiceEntry), ConfigError> {
        let key = key
            .or_else(|| self.default_service())
            .ok_or(ConfigError::NoDefaultService)?;
        self.file
            .services
            .get_key_value(key)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownService(key.to_string()))
    }
}
