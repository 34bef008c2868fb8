//! Persistence settings

use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Where analytics events are written. Registrations always use the warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventsBackend {
    /// SQLite `events` table
    #[default]
    Warehouse,
    /// One JSON document per event under `object_dir`
    Object,
}

impl EventsBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "warehouse" => Some(Self::Warehouse),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub events_backend: EventsBackend,
    pub db_path: PathBuf,
    pub object_dir: PathBuf,
    /// Maximum pooled SQLite connections
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            events_backend: EventsBackend::Warehouse,
            db_path: PathBuf::from("./data/beaconlog.db"),
            object_dir: PathBuf::from("./data/events"),
            pool_size: 4,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileStorage {
    pub events_backend: Option<String>,
    pub db_path: Option<String>,
    pub object_dir: Option<String>,
    pub pool_size: Option<u32>,
}

impl StorageConfig {
    pub fn from_file(
        file: Option<FileStorage>,
        backend_override: Option<String>,
        db_path_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let events_backend = match backend_override.or(file.events_backend) {
            Some(raw) => EventsBackend::parse(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "events_backend: {raw:?} is not one of warehouse, object"
                ))
            })?,
            None => defaults.events_backend,
        };

        let pool_size = file.pool_size.unwrap_or(defaults.pool_size);
        if pool_size == 0 {
            return Err(ConfigError::Invalid(
                "pool_size: must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            events_backend,
            db_path: db_path_override
                .or(file.db_path)
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            object_dir: file
                .object_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.object_dir),
            pool_size,
        })
    }
}
