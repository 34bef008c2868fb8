//! Configuration for the collector
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (`$BEACONLOG_CONFIG_PATH` or ~/.config/beaconlog/config.toml)
//! 3. Built-in defaults (lowest priority)
//!
//! The resolved [`Config`] is passed explicitly to the storage layer and the
//! HTTP server; nothing here is process-global.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod serialization;
mod server;
mod storage;

#[cfg(test)]
mod tests;

pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use server::{FileServer, ServerConfig, DEFAULT_VERSION_HEADER};
pub use storage::{EventsBackend, FileStorage, StorageConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8888";

pub const ENV_CONFIG_PATH: &str = "BEACONLOG_CONFIG_PATH";
pub const ENV_BIND: &str = "BEACONLOG_BIND";
pub const ENV_RATE_LIMIT: &str = "BEACONLOG_RATE_LIMIT";
pub const ENV_EVENTS_BACKEND: &str = "BEACONLOG_EVENTS_BACKEND";
pub const ENV_DB_PATH: &str = "BEACONLOG_DB_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid setting {0}")]
    Invalid(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address the collector listens on
    pub bind_addr: SocketAddr,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,

    /// Optional [server] section
    pub server: Option<FileServer>,

    /// Optional [storage] section
    pub storage: Option<FileStorage>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// `$BEACONLOG_CONFIG_PATH`, else ~/.config/beaconlog/config.toml.
    /// Uses Unix-style ~/.config on all platforms for consistency.
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|p| p.join(".config").join("beaconlog").join("config.toml"))
    }

    /// Write the default template if no config file exists yet
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        // Config is optional, failure here is not fatal
        let _ = Self::write_template(&path);
    }

    /// Overwrite `path` with the default template
    pub fn write_template(path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::default().to_toml())
    }

    fn load_file_config() -> Result<FileConfig, ConfigError> {
        let Some(path) = Self::config_path() else {
            return Ok(FileConfig::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Load configuration: env -> file -> defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = Self::load_file_config()?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with overrides looked up through `env`
    pub(crate) fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw_bind = env(ENV_BIND)
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bind_addr: {raw_bind:?} is not host:port")))?;

        let server = ServerConfig::from_file(file.server, env(ENV_RATE_LIMIT))?;
        let storage =
            StorageConfig::from_file(file.storage, env(ENV_EVENTS_BACKEND), env(ENV_DB_PATH))?;
        let logging = LoggingConfig::from_file(file.logging);

        Ok(Self {
            bind_addr,
            server,
            storage,
            logging,
        })
    }
}
