//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Render as a commented config file
    pub fn to_toml(&self) -> String {
        format!(
            r#"# beaconlog configuration
# Environment variables override these values.

# Collector bind address (BEACONLOG_BIND)
bind_addr = "{bind}"

[server]
# Per-address request limit: <count>/<second|minute|hour|day> (BEACONLOG_RATE_LIMIT)
request_rate_limit = "{rate_limit}"
# Header every client must send; /health is exempt
version_header = "{version_header}"

[storage]
# Events backend: warehouse (SQLite table) or object (JSON files) (BEACONLOG_EVENTS_BACKEND)
events_backend = "{events_backend}"
# SQLite warehouse, also holds registrations (BEACONLOG_DB_PATH)
db_path = "{db_path}"
# Root for date-partitioned event objects
object_dir = "{object_dir}"
pool_size = {pool_size}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# JSON file logging in addition to stdout
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"
"#,
            bind = self.bind_addr,
            rate_limit = self.server.request_rate_limit.to_config_string(),
            version_header = self.server.version_header,
            events_backend = self.storage.events_backend.as_str(),
            db_path = toml_path(&self.storage.db_path),
            object_dir = toml_path(&self.storage.object_dir),
            pool_size = self.storage.pool_size,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = toml_path(&self.logging.file_dir),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
        )
    }
}

/// Path as the inside of a TOML basic string
fn toml_path(path: &std::path::Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}
