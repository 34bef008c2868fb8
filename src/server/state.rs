//! Shared state handed to every handler

use std::sync::Arc;

use axum::http::HeaderName;

use super::rate_limit::RateLimiter;
use crate::config::{ConfigError, ServerConfig};
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub(crate) storage: Storage,
    pub(crate) limiter: Arc<RateLimiter>,
    /// Required on every route except the health check
    pub(crate) version_header: HeaderName,
}

impl AppState {
    pub fn new(storage: Storage, config: &ServerConfig) -> Result<Self, ConfigError> {
        let version_header = HeaderName::from_bytes(config.version_header.as_bytes())
            .map_err(|e| ConfigError::Invalid(format!("version_header: {e}")))?;

        Ok(Self {
            storage,
            limiter: Arc::new(RateLimiter::new(config.request_rate_limit)),
            version_header,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
