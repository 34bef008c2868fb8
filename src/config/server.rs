//! HTTP collector settings

use serde::Deserialize;

use super::ConfigError;
use crate::server::rate_limit::RateLimit;

/// Header every client must send, except on the health check
pub const DEFAULT_VERSION_HEADER: &str = "X-Beaconlog-Version";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Per-address limit, e.g. `100/minute`
    pub request_rate_limit: RateLimit,
    pub version_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_rate_limit: RateLimit::default(),
            version_header: DEFAULT_VERSION_HEADER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileServer {
    pub request_rate_limit: Option<String>,
    pub version_header: Option<String>,
}

impl ServerConfig {
    /// `rate_limit_override` comes from the environment and beats the file
    pub fn from_file(
        file: Option<FileServer>,
        rate_limit_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let request_rate_limit = match rate_limit_override.or(file.request_rate_limit) {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("request_rate_limit: {e}")))?,
            None => defaults.request_rate_limit,
        };

        let version_header = file
            .version_header
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(defaults.version_header);
        if axum::http::HeaderName::from_bytes(version_header.as_bytes()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "version_header: {version_header:?} is not a valid header name"
            )));
        }

        Ok(Self {
            request_rate_limit,
            version_header,
        })
    }
}
