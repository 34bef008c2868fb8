//! Registration schema: a client opting in with contact details

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{
    check_email, check_is_past_utc_at, check_not_empty, check_not_identifiable, parse_timestamp,
};
use crate::error::{ValidationError, ValidationResult};

/// JSON body accepted by `POST /registrations` and `PATCH /registrations`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Defaults to the validation time when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Defaults to the validation time when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A validated registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub client_id: String,
    pub email: String,
    pub organization: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn from_json(value: Value) -> ValidationResult<Self> {
        let payload: RegistrationPayload = serde_json::from_value(value)?;
        Self::from_payload(payload)
    }

    pub fn from_payload(payload: RegistrationPayload) -> ValidationResult<Self> {
        Self::from_payload_at(payload, Utc::now())
    }

    /// Validate in order: client_id, email, organization, created_at, updated_at
    pub fn from_payload_at(payload: RegistrationPayload, now: DateTime<Utc>) -> ValidationResult<Self> {
        let client_id = payload
            .client_id
            .ok_or(ValidationError::MissingField("client_id"))?;
        let email = payload.email.ok_or(ValidationError::MissingField("email"))?;
        let organization = payload
            .organization
            .ok_or(ValidationError::MissingField("organization"))?;

        check_not_identifiable(&client_id)?;
        let email = check_email(&email)?.to_string();
        check_not_empty("organization", &organization)?;

        let created_at = past_or_now("created_at", payload.created_at.as_deref(), now)?;
        let updated_at = past_or_now("updated_at", payload.updated_at.as_deref(), now)?;

        Ok(Self {
            client_id,
            email,
            organization,
            created_at,
            updated_at,
        })
    }

    /// Wire form; timestamps at the microsecond precision they are stored with
    pub fn to_payload(&self) -> RegistrationPayload {
        RegistrationPayload {
            client_id: Some(self.client_id.clone()),
            email: Some(self.email.clone()),
            organization: Some(self.organization.clone()),
            created_at: Some(self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            updated_at: Some(self.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

fn past_or_now(
    field: &'static str,
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> ValidationResult<DateTime<Utc>> {
    match raw {
        Some(raw) => check_is_past_utc_at(field, parse_timestamp(field, raw)?, now),
        None => Ok(now),
    }
}

impl TryFrom<RegistrationPayload> for Registration {
    type Error = ValidationError;

    fn try_from(payload: RegistrationPayload) -> Result<Self, Self::Error> {
        Self::from_payload(payload)
    }
}
