//! Persistence adapter
//!
//! Takes validated submissions and commits each one exactly once. Events go
//! to the configured [`EventSink`] (warehouse table or object store),
//! registrations always go to the warehouse.
//!
//! ```text
//! handler ──spawn_blocking──→ Storage::persist(Submission)
//!                                │
//!                                ├── Event ──→ AnalyticsRow ──→ EventSink
//!                                │               (endpoint truncated,
//!                                │                flags joined,
//!                                │                nested JSON as text)
//!                                │
//!                                └── Registration ──→ RegistrationStore
//! ```
//!
//! Only the [`AuditView`] of an event is ever logged.

pub mod object;
pub mod warehouse;

pub use object::ObjectStore;
pub use warehouse::Warehouse;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{EventsBackend, StorageConfig};
use crate::schema::validation::{parse_endpoint_url, HttpMethod, ResourceCounts};
use crate::schema::{AnalyticsEvent, Registration, Submission};

/// Event attributes that never appear in logs
pub const EXCLUDED_ATTRIBUTES: [&str; 4] = ["client_id", "endpoint", "extra_data", "os"];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no registration for client_id {0}")]
    NotFound(String),

    #[error("registration already exists for client_id {0}")]
    Conflict(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persisted projection of an [`AnalyticsEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub client_id: String,
    pub product_name: String,
    pub production_version: String,
    pub os: String,
    pub docker: bool,
    pub developer: bool,
    /// JSON text
    pub resource_counts: Option<String>,
    pub event: String,
    pub command: Option<String>,
    /// `", "`-joined
    pub flags: Option<String>,
    /// `"<METHOD>: <path>"`
    pub endpoint: Option<String>,
    pub status_code: Option<i64>,
    pub error: Option<String>,
    pub local_host: Option<bool>,
    /// JSON text
    pub extra_data: Option<String>,
    pub event_created_at: String,
    pub event_loaded_at: String,
}

impl AnalyticsRow {
    pub fn from_event(event: &AnalyticsEvent, loaded_at: DateTime<Utc>) -> StorageResult<Self> {
        let resource_counts = event
            .resource_counts()
            .map(|counts: ResourceCounts| serde_json::to_string(&counts))
            .transpose()?;
        // Empty collections are stored as NULL, same as absent ones
        let extra_data = event
            .extra_data()
            .filter(|extra| !extra.is_empty())
            .map(serde_json::to_string)
            .transpose()?;

        // Truncated again here rather than trusting the validator's form
        let endpoint = event.endpoint().and_then(|endpoint| {
            let truncated = truncate_endpoint(&endpoint.to_string());
            if truncated.is_none() {
                tracing::warn!("Dropping endpoint that could not be truncated");
            }
            truncated
        });

        Ok(Self {
            client_id: event.client_id().to_string(),
            product_name: event.product_name().to_string(),
            production_version: event.production_version().to_string(),
            os: event.os().to_string(),
            docker: event.docker(),
            developer: event.developer(),
            resource_counts,
            event: event.event().to_string(),
            command: event.command().map(str::to_string),
            flags: event
                .flags()
                .filter(|flags| !flags.is_empty())
                .map(|flags| flags.join(", ")),
            endpoint,
            status_code: event.status_code(),
            error: event.error().map(str::to_string),
            local_host: event.local_host(),
            extra_data,
            event_created_at: timestamp(event.event_created_at()),
            event_loaded_at: timestamp(loaded_at),
        })
    }
}

pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reduce `"<METHOD>: <url>"` to `"<METHOD>: <path>"`, dropping host and query
pub fn truncate_endpoint(endpoint: &str) -> Option<String> {
    let (method, url) = endpoint.split_once(':')?;
    let method: HttpMethod = method.trim().parse().ok()?;
    let url = parse_endpoint_url(url.trim())?;
    Some(format!("{}: {}", method, url.path()))
}

/// PII-free projection of an event, safe to log
#[derive(Debug, Serialize)]
pub struct AuditView<'a> {
    pub event: &'a str,
    pub event_created_at: DateTime<Utc>,
    pub product_name: &'a str,
    pub production_version: &'a str,
    pub docker: bool,
    pub developer: bool,
    pub local_host: Option<bool>,
    pub command: Option<&'a str>,
    pub error: Option<&'a str>,
    pub status_code: Option<i64>,
    pub flags: Option<&'a [String]>,
    pub resource_counts: Option<ResourceCounts>,
}

impl<'a> AuditView<'a> {
    pub fn of(event: &'a AnalyticsEvent) -> Self {
        Self {
            event: event.event(),
            event_created_at: event.event_created_at(),
            product_name: event.product_name(),
            production_version: event.production_version(),
            docker: event.docker(),
            developer: event.developer(),
            local_host: event.local_host(),
            command: event.command(),
            error: event.error(),
            status_code: event.status_code(),
            flags: event.flags(),
            resource_counts: event.resource_counts(),
        }
    }
}

/// Destination for analytics events
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Commit one row atomically
    fn write_event(&self, row: &AnalyticsRow) -> StorageResult<()>;
}

/// Registration lifecycle
pub trait RegistrationStore: Send + Sync {
    /// Fails with [`StorageError::Conflict`] if the client is already registered
    fn create_registration(&self, registration: &Registration) -> StorageResult<()>;

    /// Replace email and organization, stamping `updated_at`.
    /// Returns the stored record.
    fn update_registration(
        &self,
        registration: &Registration,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<Registration>;

    fn delete_registration(&self, client_id: &str) -> StorageResult<()>;

    /// Newest first
    fn list_registrations(&self, limit: usize, offset: usize) -> StorageResult<Vec<Registration>>;
}

/// Façade handed to the HTTP layer
#[derive(Clone)]
pub struct Storage {
    events: Arc<dyn EventSink>,
    registrations: Arc<dyn RegistrationStore>,
}

impl Storage {
    pub fn new(events: Arc<dyn EventSink>, registrations: Arc<dyn RegistrationStore>) -> Self {
        Self {
            events,
            registrations,
        }
    }

    /// Open the backends named by the configuration
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let warehouse = Arc::new(Warehouse::open(&config.db_path, config.pool_size)?);
        let events: Arc<dyn EventSink> = match config.events_backend {
            EventsBackend::Warehouse => warehouse.clone(),
            EventsBackend::Object => Arc::new(ObjectStore::open(&config.object_dir)?),
        };

        tracing::info!(
            events = events.name(),
            db = %config.db_path.display(),
            "Storage ready"
        );
        Ok(Self::new(events, warehouse))
    }

    pub fn events_backend(&self) -> &'static str {
        self.events.name()
    }

    /// Commit a validated submission
    pub fn persist(&self, submission: &Submission) -> StorageResult<()> {
        match submission {
            Submission::Event(event) => self.persist_event(event),
            Submission::Registration(registration) => {
                self.registrations.create_registration(registration)?;
                tracing::info!(client_id = %registration.client_id, "Registration created");
                Ok(())
            }
        }
    }

    fn persist_event(&self, event: &AnalyticsEvent) -> StorageResult<()> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let audit = serde_json::to_string(&AuditView::of(event))?;
            tracing::debug!(
                excluded = ?EXCLUDED_ATTRIBUTES,
                audit = %audit,
                "Persisting event"
            );
        }

        let row = AnalyticsRow::from_event(event, Utc::now())?;
        self.events.write_event(&row)
    }

    pub fn update_registration(&self, registration: &Registration) -> StorageResult<Registration> {
        let updated = self
            .registrations
            .update_registration(registration, Utc::now())?;
        tracing::info!(client_id = %updated.client_id, "Registration updated");
        Ok(updated)
    }

    pub fn delete_registration(&self, client_id: &str) -> StorageResult<()> {
        self.registrations.delete_registration(client_id)?;
        tracing::info!(client_id = %client_id, "Registration deleted");
        Ok(())
    }

    pub fn list_registrations(&self, limit: usize, offset: usize) -> StorageResult<Vec<Registration>> {
        self.registrations.list_registrations(limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> AnalyticsEvent {
        AnalyticsEvent::from_json(json!({
            "client_id": "test_client_id",
            "event": "test_event_type",
            "event_created_at": "2022-02-21T19:56:11Z",
            "os": "darwin",
            "product_name": "test_product",
            "production_version": "1.2.3",
            "status_code": 500,
            "endpoint": "GET: https://www.example.com/path/string?secret=1",
            "flags": ["-f", "-y", "--test=value"],
            "command": "apply",
            "error": "Internal Server Error",
            "local_host": true,
            "extra_data": {"extra_value": "extra_value"},
            "resource_counts": {"datasets": 1, "policies": 1, "systems": 27},
        }))
        .unwrap()
    }

    #[test]
    fn test_row_projection() {
        let loaded = Utc::now();
        let row = AnalyticsRow::from_event(&event(), loaded).unwrap();

        assert_eq!(row.endpoint.as_deref(), Some("GET: /path/string"));
        assert_eq!(row.flags.as_deref(), Some("-f, -y, --test"));
        assert_eq!(row.extra_data.as_deref(), Some(r#"{"extra_value":"extra_value"}"#));
        assert_eq!(
            row.resource_counts.as_deref(),
            Some(r#"{"datasets":1,"policies":1,"systems":27}"#)
        );
        assert_eq!(row.event_created_at, "2022-02-21T19:56:11.000000Z");
        assert_eq!(row.event_loaded_at, timestamp(loaded));
        assert!(!row.developer);
    }

    #[test]
    fn test_empty_collections_project_to_null() {
        let event = AnalyticsEvent::from_json(json!({
            "client_id": "abc123",
            "event": "cli_command",
            "event_created_at": "2022-02-21T19:56:11Z",
            "os": "darwin",
            "product_name": "fidesctl",
            "production_version": "1.0.0",
            "flags": [],
            "extra_data": {},
        }))
        .unwrap();

        let row = AnalyticsRow::from_event(&event, Utc::now()).unwrap();
        assert!(row.flags.is_none());
        assert!(row.extra_data.is_none());
    }

    #[test]
    fn test_truncate_endpoint() {
        assert_eq!(
            truncate_endpoint("POST: http://0.0.0.0:8080/api/v1/x?y=1").as_deref(),
            Some("POST: /api/v1/x")
        );
        assert_eq!(truncate_endpoint("GET: /already/a/path").as_deref(), Some("GET: /already/a/path"));
        assert_eq!(truncate_endpoint("GET: https://example.com").as_deref(), Some("GET: /"));
        assert!(truncate_endpoint("no colon").is_none());
        assert!(truncate_endpoint("FETCH: https://example.com/").is_none());
    }

    #[test]
    fn test_audit_view_has_no_pii() {
        let event = event();
        let audit = serde_json::to_value(AuditView::of(&event)).unwrap();
        let audit = audit.as_object().unwrap();

        for key in EXCLUDED_ATTRIBUTES {
            assert!(!audit.contains_key(key), "{key} leaked into audit view");
        }
        let rendered = serde_json::to_string(audit).unwrap();
        assert!(!rendered.contains("test_client_id"));
        assert!(!rendered.contains("example.com"));
        assert!(!rendered.contains("darwin"));
        assert_eq!(audit["command"], "apply");
    }
}
