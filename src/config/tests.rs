//! Configuration tests

use super::*;
use crate::server::rate_limit::{Period, RateLimit};
use std::collections::HashMap;

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

/// The generated template must parse back into the same effective config
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );

    let resolved = Config::resolve(parsed.unwrap(), no_env).unwrap();
    assert_eq!(resolved, config);
}

#[test]
fn test_config_roundtrip_custom() {
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1:9000".parse().unwrap();
    config.server.request_rate_limit = "7/hour".parse().unwrap();
    config.storage.events_backend = EventsBackend::Object;
    config.storage.object_dir = PathBuf::from("/var/lib/beaconlog/events");
    config.storage.pool_size = 9;
    config.logging.file_enabled = true;
    config.logging.file_rotation = LogRotation::Hourly;

    let parsed: FileConfig = toml::from_str(&config.to_toml()).unwrap();
    assert_eq!(Config::resolve(parsed, no_env).unwrap(), config);
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::resolve(FileConfig::default(), no_env).unwrap();
    assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
    assert_eq!(
        config.server.request_rate_limit,
        RateLimit {
            requests: 100,
            period: Period::Minute
        }
    );
    assert_eq!(config.server.version_header, "X-Beaconlog-Version");
    assert_eq!(config.storage.db_path, PathBuf::from("./data/beaconlog.db"));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_env_beats_file() {
    let file: FileConfig = toml::from_str(
        r#"
        bind_addr = "127.0.0.1:1111"
        [server]
        request_rate_limit = "10/second"
        [storage]
        events_backend = "object"
        db_path = "/from/file.db"
        "#,
    )
    .unwrap();

    let env = env_from(&[
        (ENV_BIND, "127.0.0.1:2222"),
        (ENV_RATE_LIMIT, "3/day"),
        (ENV_EVENTS_BACKEND, "warehouse"),
        (ENV_DB_PATH, "/from/env.db"),
    ]);
    let config = Config::resolve(file, env).unwrap();

    assert_eq!(config.bind_addr.port(), 2222);
    assert_eq!(config.server.request_rate_limit.to_config_string(), "3/day");
    assert_eq!(config.storage.events_backend, EventsBackend::Warehouse);
    assert_eq!(config.storage.db_path, PathBuf::from("/from/env.db"));
}

#[test]
fn test_file_beats_defaults() {
    let file: FileConfig = toml::from_str(
        r#"
        [logging]
        level = "debug"
        file_rotation = "never"
        [storage]
        pool_size = 2
        "#,
    )
    .unwrap();
    let config = Config::resolve(file, no_env).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file_rotation, LogRotation::Never);
    assert_eq!(config.storage.pool_size, 2);
    assert_eq!(config.logging.file_prefix, "beaconlog");
}

// ─────────────────────────────────────────────────────────────────────────────
// Invalid values
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_values_are_errors() {
    let bad_bind = Config::resolve(FileConfig::default(), env_from(&[(ENV_BIND, "nowhere")]));
    assert!(matches!(bad_bind, Err(ConfigError::Invalid(msg)) if msg.starts_with("bind_addr")));

    let bad_rate = Config::resolve(
        FileConfig::default(),
        env_from(&[(ENV_RATE_LIMIT, "lots")]),
    );
    assert!(matches!(bad_rate, Err(ConfigError::Invalid(_))));

    let bad_backend = Config::resolve(
        FileConfig::default(),
        env_from(&[(ENV_EVENTS_BACKEND, "s3")]),
    );
    assert!(matches!(bad_backend, Err(ConfigError::Invalid(_))));

    let file: FileConfig = toml::from_str("[server]\nversion_header = \"bad header\"").unwrap();
    assert!(Config::resolve(file, no_env).is_err());
}

#[test]
fn test_unknown_rotation_falls_back_to_daily() {
    assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
    assert_eq!(LogRotation::parse("HOURLY"), LogRotation::Hourly);
}

#[test]
fn test_write_template() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    Config::write_template(&path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("# beaconlog configuration"));
    assert!(toml::from_str::<FileConfig>(&contents).is_ok());
}
