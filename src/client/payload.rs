//! Payload builder: client constants + one event's fields → wire payload

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::{ClientConfig, ClientError};
use crate::schema::{
    AnalyticsEvent, EventPayload, Registration, RegistrationPayload, ResourceCounts,
};

/// Per-event fields, set by the caller for each send
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub event: String,
    pub event_created_at: DateTime<Utc>,
    pub docker: bool,
    pub local_host: Option<bool>,
    pub command: Option<String>,
    pub endpoint: Option<String>,
    pub error: Option<String>,
    pub status_code: Option<i64>,
    pub flags: Vec<String>,
    /// Merged over the client's defaults, these keys win
    pub extra_data: Map<String, Value>,
    pub resource_counts: Option<ResourceCounts>,
}

impl EventDetails {
    /// An event of type `event` that happened at `created_at`.
    ///
    /// The collector only accepts timestamps strictly in the past, so the
    /// caller records the moment itself rather than taking "now" at send time.
    pub fn new(event: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            event_created_at: created_at,
            docker: false,
            local_host: None,
            command: None,
            endpoint: None,
            error: None,
            status_code: None,
            flags: Vec::new(),
            extra_data: Map::new(),
            resource_counts: None,
        }
    }

    pub fn docker(mut self, docker: bool) -> Self {
        self.docker = docker;
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// `"<METHOD>: <url>"` plus whether the server was on the local machine
    pub fn endpoint(mut self, endpoint: impl Into<String>, local_host: bool) -> Self {
        self.endpoint = Some(endpoint.into());
        self.local_host = Some(local_host);
        self
    }

    pub fn status_code(mut self, status_code: i64) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Error category, e.g. an exception type name
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_data.insert(key.into(), value.into());
        self
    }

    pub fn resource_counts(mut self, counts: ResourceCounts) -> Self {
        self.resource_counts = Some(counts);
        self
    }
}

/// Contact details for an opt-in registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDetails {
    pub email: String,
    pub organization: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Build and pre-flight validate the wire payload for one event.
///
/// Optional fields are omitted rather than sent as null when empty.
pub fn build_event_payload(
    config: &ClientConfig,
    details: &EventDetails,
) -> Result<EventPayload, ClientError> {
    Ok(build_event(config, details)?.to_payload())
}

pub(crate) fn build_event(
    config: &ClientConfig,
    details: &EventDetails,
) -> Result<AnalyticsEvent, ClientError> {
    let mut extra_data = config.extra_data.clone();
    extra_data.extend(details.extra_data.clone());

    let payload = EventPayload {
        client_id: Some(config.client_id.clone()),
        event: Some(details.event.clone()),
        event_created_at: Some(
            details
                .event_created_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ),
        os: Some(config.os.clone()),
        product_name: Some(config.product_name.clone()),
        production_version: Some(config.production_version.clone()),
        docker: Some(details.docker),
        developer: Some(config.developer_mode),
        local_host: details.local_host,
        command: non_empty(&details.command),
        endpoint: non_empty(&details.endpoint),
        error: non_empty(&details.error),
        status_code: details.status_code,
        flags: Some(details.flags.clone()).filter(|flags| !flags.is_empty()),
        extra_data: Some(extra_data).filter(|extra| !extra.is_empty()),
        resource_counts: details
            .resource_counts
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ClientError::Unknown(e.to_string()))?,
    };

    Ok(AnalyticsEvent::from_payload(payload)?)
}

/// Validate a registration for this client
pub fn build_registration(
    config: &ClientConfig,
    details: &RegistrationDetails,
) -> Result<Registration, ClientError> {
    let payload = RegistrationPayload {
        client_id: Some(config.client_id.clone()),
        email: Some(details.email.clone()),
        organization: Some(details.organization.clone()),
        created_at: None,
        updated_at: None,
    };
    Ok(Registration::from_payload(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::Duration;
    use serde_json::json;

    fn config() -> ClientConfig {
        let mut extra = Map::new();
        extra.insert("shared".into(), json!("client"));
        extra.insert("region".into(), json!("eu"));
        ClientConfig::new("test_client_id", "darwin", "fidesctl", "1.2.3")
            .developer_mode(true)
            .extra_data(extra)
    }

    fn a_minute_ago() -> EventDetails {
        EventDetails::new("cli_command", Utc::now() - Duration::minutes(1))
    }

    #[test]
    fn test_minimal_payload_omits_optionals() {
        let payload = build_event_payload(&config(), &a_minute_ago()).unwrap();
        let body = serde_json::to_value(&payload).unwrap();
        let body = body.as_object().unwrap();

        for absent in ["command", "endpoint", "error", "flags", "status_code", "resource_counts", "local_host"] {
            assert!(!body.contains_key(absent), "{absent} should be omitted");
        }
        assert_eq!(body["developer"], true);
        assert_eq!(body["docker"], false);
        assert_eq!(body["os"], "darwin");
        assert_eq!(body["extra_data"], json!({"shared": "client", "region": "eu"}));
    }

    #[test]
    fn test_event_extra_data_overrides_client() {
        let details = a_minute_ago().extra("shared", "event").extra("only_event", 1);
        let payload = build_event_payload(&config(), &details).unwrap();
        assert_eq!(
            Value::Object(payload.extra_data.unwrap()),
            json!({"shared": "event", "region": "eu", "only_event": 1})
        );
    }

    #[test]
    fn test_full_payload() {
        let details = a_minute_ago()
            .command("apply")
            .endpoint("GET: https://example.com/api/x?y=1", false)
            .status_code(500)
            .error("ServerError")
            .flags(["--dry", "--name=secret"])
            .resource_counts(ResourceCounts {
                datasets: 1,
                policies: 2,
                systems: 3,
            });
        let payload = build_event_payload(&config(), &details).unwrap();

        assert_eq!(payload.command.as_deref(), Some("apply"));
        assert_eq!(
            payload.endpoint.as_deref(),
            Some("GET: https://example.com/api/x?y=1")
        );
        assert_eq!(payload.local_host, Some(false));
        assert_eq!(payload.flags.unwrap(), ["--dry", "--name"]);
        assert_eq!(
            payload.resource_counts.unwrap(),
            json!({"datasets": 1, "policies": 2, "systems": 3})
        );
    }

    #[test]
    fn test_preflight_rejects_invalid_event() {
        let details = a_minute_ago().error("ServerError").status_code(201);
        let err = build_event_payload(&config(), &details).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidEvent(ValidationError::StatusIndicatesSuccess)
        ));

        let future = EventDetails::new("x", Utc::now() + Duration::hours(1));
        assert!(build_event_payload(&config(), &future).is_err());
    }

    #[test]
    fn test_payload_carries_callers_timestamp() {
        let at = Utc::now() - Duration::minutes(5);
        let payload = build_event_payload(&config(), &EventDetails::new("x", at)).unwrap();
        assert_eq!(
            payload.event_created_at.unwrap(),
            at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        );
    }

    #[test]
    fn test_empty_strings_are_omitted() {
        let mut details = a_minute_ago();
        details.command = Some(String::new());
        let payload = build_event_payload(&config(), &details).unwrap();
        assert!(payload.command.is_none());
    }

    #[test]
    fn test_build_registration() {
        let details = RegistrationDetails {
            email: "johndoe@example.com".into(),
            organization: "ACME".into(),
        };
        let registration = build_registration(&config(), &details).unwrap();
        assert_eq!(registration.client_id, "test_client_id");

        let bad = RegistrationDetails {
            email: "not-an-email".into(),
            organization: "ACME".into(),
        };
        assert!(matches!(
            build_registration(&config(), &bad),
            Err(ClientError::InvalidEvent(ValidationError::InvalidEmail))
        ));
    }
}
