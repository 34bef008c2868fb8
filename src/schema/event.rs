//! Analytics event schema
//!
//! [`EventPayload`] is the wire shape: every field optional so that a
//! missing required field is reported by the validator with a readable
//! message instead of a serde error. [`AnalyticsEvent`] is the accepted,
//! immutable result of running the payload through the rules in order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::validation::{
    check_endpoint_format, check_error_implies_failure_status, check_flags,
    check_is_past_utc_at, check_not_identifiable, check_resource_counts,
    check_status_required_if, parse_timestamp, Endpoint, ResourceCounts,
};
use crate::error::{ValidationError, ValidationResult};

/// JSON body accepted by `POST /events` and produced by the SDK
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// ISO 8601 with an explicit UTC offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// `"<METHOD>: <url-or-path>"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Error category only, never a message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Map<String, Value>>,
    /// Kept untyped so partial objects reach the resource-count rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_counts: Option<Value>,
}

/// A validated analytics event
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub(crate) client_id: String,
    pub(crate) event: String,
    pub(crate) event_created_at: DateTime<Utc>,
    pub(crate) os: String,
    pub(crate) product_name: String,
    pub(crate) production_version: String,
    pub(crate) docker: bool,
    pub(crate) developer: bool,
    pub(crate) local_host: Option<bool>,
    pub(crate) command: Option<String>,
    pub(crate) endpoint: Option<Endpoint>,
    pub(crate) error: Option<String>,
    pub(crate) status_code: Option<i64>,
    pub(crate) flags: Option<Vec<String>>,
    pub(crate) extra_data: Option<Map<String, Value>>,
    pub(crate) resource_counts: Option<ResourceCounts>,
}

fn required(field: &'static str, value: Option<String>) -> ValidationResult<String> {
    value.ok_or(ValidationError::MissingField(field))
}

impl AnalyticsEvent {
    /// Validate an untyped JSON body
    pub fn from_json(value: Value) -> ValidationResult<Self> {
        let payload: EventPayload = serde_json::from_value(value)?;
        Self::from_payload(payload)
    }

    /// Validate a payload against the current time
    pub fn from_payload(payload: EventPayload) -> ValidationResult<Self> {
        Self::from_payload_at(payload, Utc::now())
    }

    /// Validate a payload, stopping at the first failed rule.
    ///
    /// Order: required fields, client_id, timestamp, resource counts,
    /// endpoint with local_host, flags, status requirement, error/status.
    pub fn from_payload_at(payload: EventPayload, now: DateTime<Utc>) -> ValidationResult<Self> {
        let client_id = required("client_id", payload.client_id)?;
        let event = required("event", payload.event)?;
        let raw_created_at = required("event_created_at", payload.event_created_at)?;
        let os = required("os", payload.os)?;
        let product_name = required("product_name", payload.product_name)?;
        let production_version = required("production_version", payload.production_version)?;

        check_not_identifiable(&client_id)?;

        let event_created_at = check_is_past_utc_at(
            "event_created_at",
            parse_timestamp("event_created_at", &raw_created_at)?,
            now,
        )?;

        let resource_counts = payload
            .resource_counts
            .filter(|v| !v.is_null())
            .map(|v| check_resource_counts(&v))
            .transpose()?;

        let endpoint = payload
            .endpoint
            .as_deref()
            .map(check_endpoint_format)
            .transpose()?;
        if endpoint.is_some() && payload.local_host.is_none() {
            return Err(ValidationError::MissingLocalHost);
        }

        let flags = payload.flags.map(|flags| check_flags(flags.as_slice()));

        check_status_required_if(
            payload.command.is_some() || endpoint.is_some(),
            payload.status_code,
        )?;
        check_error_implies_failure_status(payload.error.as_deref(), payload.status_code)?;

        Ok(Self {
            client_id,
            event,
            event_created_at,
            os,
            product_name,
            production_version,
            docker: payload.docker.unwrap_or(false),
            developer: payload.developer.unwrap_or(false),
            local_host: payload.local_host,
            command: payload.command,
            endpoint,
            error: payload.error,
            status_code: payload.status_code,
            flags,
            extra_data: payload.extra_data,
            resource_counts,
        })
    }

    /// Wire form, endpoint with its full URL
    pub fn to_payload(&self) -> EventPayload {
        let mut payload = self.base_payload();
        payload.endpoint = self.endpoint.as_ref().map(Endpoint::to_string);
        payload
    }

    /// Wire form with the endpoint reduced to `"<METHOD>: <path>"`
    pub fn truncated_payload(&self) -> EventPayload {
        let mut payload = self.base_payload();
        payload.endpoint = self.endpoint.as_ref().map(Endpoint::truncated);
        payload
    }

    fn base_payload(&self) -> EventPayload {
        EventPayload {
            client_id: Some(self.client_id.clone()),
            event: Some(self.event.clone()),
            event_created_at: Some(
                self.event_created_at
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            os: Some(self.os.clone()),
            product_name: Some(self.product_name.clone()),
            production_version: Some(self.production_version.clone()),
            docker: Some(self.docker),
            developer: Some(self.developer),
            local_host: self.local_host,
            command: self.command.clone(),
            endpoint: None,
            error: self.error.clone(),
            status_code: self.status_code,
            flags: self.flags.clone(),
            extra_data: self.extra_data.clone(),
            resource_counts: self
                .resource_counts
                .and_then(|counts| serde_json::to_value(counts).ok()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn event_created_at(&self) -> DateTime<Utc> {
        self.event_created_at
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn production_version(&self) -> &str {
        &self.production_version
    }

    pub fn docker(&self) -> bool {
        self.docker
    }

    pub fn developer(&self) -> bool {
        self.developer
    }

    pub fn local_host(&self) -> Option<bool> {
        self.local_host
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status_code(&self) -> Option<i64> {
        self.status_code
    }

    pub fn flags(&self) -> Option<&[String]> {
        self.flags.as_deref()
    }

    pub fn extra_data(&self) -> Option<&Map<String, Value>> {
        self.extra_data.as_ref()
    }

    pub fn resource_counts(&self) -> Option<ResourceCounts> {
        self.resource_counts
    }
}

impl TryFrom<EventPayload> for AnalyticsEvent {
    type Error = ValidationError;

    fn try_from(payload: EventPayload) -> Result<Self, Self::Error> {
        Self::from_payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn minute_ago() -> String {
        (Utc::now() - Duration::minutes(1)).to_rfc3339()
    }

    fn minimal() -> Value {
        json!({
            "client_id": "abc123",
            "event": "cli_command",
            "event_created_at": minute_ago(),
            "os": "darwin",
            "product_name": "fidesctl",
            "production_version": "1.0.0",
        })
    }

    fn rich() -> Value {
        json!({
            "client_id": "test_client_id",
            "event": "test_event_type",
            "event_created_at": "2022-02-21 19:56:11Z",
            "os": "darwin",
            "product_name": "test_product",
            "production_version": "1.2.3",
            "status_code": 500,
            "endpoint": "GET: https://www.example.com/path/string",
            "flags": ["-f", "-y", "--test"],
            "command": "apply",
            "error": "Internal Server Error",
            "local_host": true,
            "extra_data": {"extra_value": "extra_value"},
            "docker": true,
            "resource_counts": {"datasets": 1, "policies": 1, "systems": 27},
            "developer": true,
        })
    }

    fn with(mut base: Value, key: &str, value: Value) -> Value {
        base[key] = value;
        base
    }

    #[test]
    fn test_minimal_event_defaults() {
        let event = AnalyticsEvent::from_json(minimal()).unwrap();
        assert_eq!(event.client_id(), "abc123");
        assert!(!event.docker());
        assert!(!event.developer());
        assert!(event.command().is_none());
        assert!(event.status_code().is_none());
        assert!(event.endpoint().is_none());
    }

    #[test]
    fn test_rich_event_round_trips_through_payload() {
        let event = AnalyticsEvent::from_json(rich()).unwrap();
        assert_eq!(event.flags().unwrap(), ["-f", "-y", "--test"]);
        assert_eq!(event.resource_counts().unwrap().systems, 27);

        let again = AnalyticsEvent::from_payload(event.to_payload()).unwrap();
        assert_eq!(again, event);
    }

    #[test]
    fn test_missing_required_field() {
        let mut body = minimal();
        body.as_object_mut().unwrap().remove("os");
        assert_eq!(
            AnalyticsEvent::from_json(body).unwrap_err(),
            ValidationError::MissingField("os")
        );

        let null_event = with(minimal(), "event", Value::Null);
        assert_eq!(
            AnalyticsEvent::from_json(null_event).unwrap_err(),
            ValidationError::MissingField("event")
        );
    }

    #[test]
    fn test_identifiable_client_id_wins_over_later_rules() {
        // Also has a future timestamp and a partial resource_counts
        let body = json!({
            "client_id": "someone@example.com",
            "event": "x",
            "event_created_at": (Utc::now() + Duration::days(1)).to_rfc3339(),
            "os": "linux",
            "product_name": "p",
            "production_version": "1",
            "resource_counts": {"datasets": 1},
        });
        assert_eq!(
            AnalyticsEvent::from_json(body).unwrap_err(),
            ValidationError::NotIdentifiable("client_id")
        );
    }

    #[test]
    fn test_future_and_naive_timestamps_rejected() {
        let future = with(
            minimal(),
            "event_created_at",
            json!((Utc::now() + Duration::hours(1)).to_rfc3339()),
        );
        assert_eq!(
            AnalyticsEvent::from_json(future).unwrap_err().rule(),
            "past_utc_timestamp"
        );

        let naive = with(minimal(), "event_created_at", json!("2022-02-21T19:56:11"));
        assert!(AnalyticsEvent::from_json(naive).is_err());

        let offset = with(minimal(), "event_created_at", json!("2022-02-21T19:56:11-05:00"));
        assert!(AnalyticsEvent::from_json(offset).is_err());
    }

    #[test]
    fn test_endpoint_without_local_host() {
        let body = with(
            with(minimal(), "endpoint", json!("GET: https://example.com/api/x?y=1")),
            "status_code",
            json!(200),
        );
        let err = AnalyticsEvent::from_json(body).unwrap_err();
        assert_eq!(err, ValidationError::MissingLocalHost);
        assert_eq!(err.to_string(), "local_host must be provided");
    }

    #[test]
    fn test_endpoint_with_local_host() {
        let body = with(
            with(
                with(minimal(), "endpoint", json!("post: https://example.com/api/x?y=1")),
                "local_host",
                json!(false),
            ),
            "status_code",
            json!(201),
        );
        let event = AnalyticsEvent::from_json(body).unwrap();
        assert_eq!(
            event.to_payload().endpoint.as_deref(),
            Some("POST: https://example.com/api/x?y=1")
        );
        assert_eq!(
            event.truncated_payload().endpoint.as_deref(),
            Some("POST: /api/x")
        );
    }

    #[test]
    fn test_command_requires_status_code() {
        let body = with(minimal(), "command", json!("apply"));
        assert_eq!(
            AnalyticsEvent::from_json(body).unwrap_err(),
            ValidationError::MissingStatusCode
        );
    }

    #[test]
    fn test_error_with_success_status() {
        let body = with(
            with(minimal(), "error", json!("ServerError")),
            "status_code",
            json!(201),
        );
        assert_eq!(
            AnalyticsEvent::from_json(body).unwrap_err(),
            ValidationError::StatusIndicatesSuccess
        );
    }

    #[test]
    fn test_flags_values_stripped() {
        let body = with(minimal(), "flags", json!(["--verbose", "--name=secret"]));
        let event = AnalyticsEvent::from_json(body).unwrap();
        assert_eq!(event.flags().unwrap(), ["--verbose", "--name"]);
    }

    #[test]
    fn test_explicit_nulls_accepted_for_optionals() {
        let mut body = minimal();
        for key in ["command", "endpoint", "error", "flags", "extra_data", "resource_counts", "local_host"] {
            body[key] = Value::Null;
        }
        assert!(AnalyticsEvent::from_json(body).is_ok());
    }

    #[test]
    fn test_wrong_json_type_is_malformed() {
        let body = with(minimal(), "status_code", json!("200"));
        assert_eq!(AnalyticsEvent::from_json(body).unwrap_err().rule(), "malformed");
    }
}
