//! SDK for reporting events and registrations to a collector
//!
//! ```no_run
//! use beaconlog::client::{AnalyticsClient, ClientConfig, EventDetails};
//!
//! # async fn run() -> Result<(), beaconlog::client::ClientError> {
//! let client = AnalyticsClient::new(
//!     ClientConfig::new("3f0c...", "linux", "fidesctl", "1.0.0")
//!         .server_url("https://analytics.example.com"),
//! )?;
//! let started = chrono::Utc::now();
//! // ... run the command ...
//! client
//!     .send_event(&EventDetails::new("cli_command", started).command("apply").status_code(0))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Every payload is validated locally with the same rules the collector
//! applies, so a bad event fails before any network call. Sends are
//! single attempts: no retries, no batching.

mod error;
pub mod id;
mod payload;

pub use error::ClientError;
pub use id::generate_client_id;
pub use payload::{build_event_payload, build_registration, EventDetails, RegistrationDetails};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::{Map, Value};

use crate::config::{DEFAULT_VERSION_HEADER, VERSION};
use crate::schema::{Registration, Submission};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8888";
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Constants shared by every event a client sends
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_url: String,
    /// Anonymous id, see [`generate_client_id`]
    pub client_id: String,
    pub os: String,
    pub product_name: String,
    pub production_version: String,
    pub developer_mode: bool,
    /// Defaults merged under each event's own `extra_data`
    pub extra_data: Map<String, Value>,
    pub version_header: String,
}

impl ClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        os: impl Into<String>,
        product_name: impl Into<String>,
        production_version: impl Into<String>,
    ) -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            client_id: client_id.into(),
            os: os.into(),
            product_name: product_name.into(),
            production_version: production_version.into(),
            developer_mode: false,
            extra_data: Map::new(),
            version_header: DEFAULT_VERSION_HEADER.to_string(),
        }
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn developer_mode(mut self, developer_mode: bool) -> Self {
        self.developer_mode = developer_mode;
        self
    }

    pub fn extra_data(mut self, extra_data: Map<String, Value>) -> Self {
        self.extra_data = extra_data;
        self
    }

    pub fn version_header(mut self, header: impl Into<String>) -> Self {
        self.version_header = header.into();
        self
    }

    fn check(&self) -> Result<(), ClientError> {
        let required = [
            ("client_id", &self.client_id),
            ("os", &self.os),
            ("product_name", &self.product_name),
            ("production_version", &self.production_version),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ClientError::InvalidClient(format!("{field} must be provided")));
            }
        }
        Ok(())
    }
}

pub struct AnalyticsClient {
    config: ClientConfig,
    base_url: Url,
    http: reqwest::Client,
}

impl AnalyticsClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.check()?;

        let base_url = Url::parse(&config.server_url).map_err(|e| {
            ClientError::InvalidClient(format!("server_url {:?}: {e}", config.server_url))
        })?;

        let header_name = HeaderName::from_bytes(config.version_header.as_bytes())
            .map_err(|e| ClientError::InvalidClient(format!("version_header: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(header_name, HeaderValue::from_static(VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::InvalidClient(format!("http client: {e}")))?;

        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build, validate and send one event
    pub async fn send_event(&self, details: &EventDetails) -> Result<(), ClientError> {
        let event = payload::build_event(&self.config, details)?;
        self.send(&Submission::Event(event)).await
    }

    /// Register this client's contact details
    pub async fn register(&self, details: &RegistrationDetails) -> Result<Registration, ClientError> {
        let registration = build_registration(&self.config, details)?;
        self.send(&Submission::Registration(registration.clone()))
            .await?;
        Ok(registration)
    }

    /// POST a validated submission to its collection
    pub async fn send(&self, submission: &Submission) -> Result<(), ClientError> {
        let kind = submission.kind();
        let url = self
            .base_url
            .join(kind.path())
            .map_err(|e| ClientError::InvalidClient(format!("server_url: {e}")))?;
        let body = submission
            .to_json()
            .map_err(|e| ClientError::Unknown(e.to_string()))?;

        tracing::debug!(kind = kind.as_str(), url = %url, "Sending analytics");

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Prefer the collector's {"error": ...} message over the reason phrase
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());

        Err(ClientError::Send {
            status: status.as_u16(),
            message,
        })
    }
}
