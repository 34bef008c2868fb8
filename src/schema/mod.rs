//! Shared schema: validation rules plus the event and registration models
//!
//! Both the SDK (pre-flight, before any network call) and the collector
//! (at the trust boundary) construct values through this module, so the
//! rule set cannot drift between the two sides.

pub mod event;
pub mod registration;
pub mod validation;

pub use event::{AnalyticsEvent, EventPayload};
pub use registration::{Registration, RegistrationPayload};
pub use validation::{Endpoint, HttpMethod, ResourceCounts};

use serde::Serialize;

/// Discriminant for [`Submission`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Event,
    Registration,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Event => "event",
            Kind::Registration => "registration",
        }
    }

    /// Collection path on the collector
    pub fn path(&self) -> &'static str {
        match self {
            Kind::Event => "/events",
            Kind::Registration => "/registrations",
        }
    }
}

/// A validated record on its way to the collector or to storage
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Event(AnalyticsEvent),
    Registration(Registration),
}

impl Submission {
    pub fn kind(&self) -> Kind {
        match self {
            Submission::Event(_) => Kind::Event,
            Submission::Registration(_) => Kind::Registration,
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            Submission::Event(event) => event.client_id(),
            Submission::Registration(registration) => &registration.client_id,
        }
    }

    /// JSON body for the wire
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Submission::Event(event) => serde_json::to_value(event.to_payload()),
            Submission::Registration(registration) => {
                serde_json::to_value(registration.to_payload())
            }
        }
    }
}

impl From<AnalyticsEvent> for Submission {
    fn from(event: AnalyticsEvent) -> Self {
        Submission::Event(event)
    }
}

impl From<Registration> for Submission {
    fn from(registration: Registration) -> Self {
        Submission::Registration(registration)
    }
}
