//! Field-level validation rules
//!
//! Every rule here is a pure function: no logging, no storage, and the only
//! ambient input is "now", which the `_at` variants take explicitly. The
//! event and registration schemas compose these in a fixed order; the SDK
//! and the collector both go through the same functions.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Keys that must all be present in `resource_counts`
pub const RESOURCE_COUNT_KEYS: [&str; 3] = ["datasets", "policies", "systems"];

/// Characters that start a flag's value (`--name=value`, `--name value`)
const FLAG_VALUE_DELIMITERS: [char; 2] = ['=', ' '];

// ─────────────────────────────────────────────────────────────────────────────
// HTTP methods
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP methods accepted in an `endpoint` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 9] = [
        HttpMethod::Connect,
        HttpMethod::Delete,
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Options,
        HttpMethod::Patch,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Trace => "TRACE",
        }
    }

    fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(HttpMethod::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for HttpMethod {
    type Err = ValidationError;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| {
                ValidationError::InvalidEndpoint(format!(
                    "HTTP method must be one of {}",
                    Self::allowed_list()
                ))
            })
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// A validated `"<METHOD>: <url>"` endpoint
///
/// `Display` renders the normalized form with the full URL as submitted.
/// [`Endpoint::truncated`] is the only form that may be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    method: HttpMethod,
    url: String,
    path: String,
}

impl Endpoint {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The URL exactly as submitted (trimmed)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path component of the URL, never host or query
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `"<METHOD>: <path>"`
    pub fn truncated(&self) -> String {
        format!("{}: {}", self.method, self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.url)
    }
}

/// Parse the URL half of an endpoint.
///
/// Absolute `http(s)` URLs must carry a host. A bare absolute path is
/// resolved against a loopback base so it can be checked the same way.
/// `0.0.0.0` is swapped for `localhost` only for the check itself.
pub(crate) fn parse_endpoint_url(url: &str) -> Option<Url> {
    if url.starts_with('/') {
        return Url::parse("http://localhost").ok()?.join(url).ok();
    }

    let candidate = url.replacen("://0.0.0.0", "://localhost", 1);
    let parsed = Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(parsed)
}

/// Check that `value` is `"<METHOD>: <url>"` with an allowed method.
///
/// Splits on the first colon only, so the URL's own `://` is untouched.
pub fn check_endpoint_format(value: &str) -> ValidationResult<Endpoint> {
    let Some((method, url)) = value.split_once(':') else {
        return Err(ValidationError::InvalidEndpoint(
            "endpoint must contain only the HTTP method and URL, delimited by a colon".into(),
        ));
    };

    let method: HttpMethod = method.parse()?;
    let url = url.trim();

    let parsed = parse_endpoint_url(url).ok_or_else(|| {
        ValidationError::InvalidEndpoint("endpoint URL must be a valid URL".into())
    })?;

    Ok(Endpoint {
        method,
        url: url.to_string(),
        path: parsed.path().to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity and contact rules
// ─────────────────────────────────────────────────────────────────────────────

/// Reject a `client_id` that could be an email address
pub fn check_not_identifiable(value: &str) -> ValidationResult<&str> {
    if value.contains('@') {
        return Err(ValidationError::NotIdentifiable("client_id"));
    }
    Ok(value)
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
        )
        .expect("email pattern is a valid regex")
    })
}

/// Require an address of the form `local@domain.tld`
pub fn check_email(value: &str) -> ValidationResult<&str> {
    let value = value.trim();
    if value.len() > 254 || !email_pattern().is_match(value) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(value)
}

/// Require a non-blank string
pub fn check_not_empty<'a>(field: &'static str, value: &'a str) -> ValidationResult<&'a str> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// Parse an ISO 8601 timestamp that must carry its own offset.
///
/// Accepts `T` or a space between date and time. A naive timestamp is
/// rejected rather than assumed to be UTC.
pub fn parse_timestamp(field: &'static str, raw: &str) -> ValidationResult<DateTime<FixedOffset>> {
    raw.trim()
        .parse::<DateTime<FixedOffset>>()
        .map_err(|_| ValidationError::InvalidTimestamp {
            field,
            reason: "date must be an explicit UTC timestamp",
        })
}

/// [`check_is_past_utc_at`] against the current time
pub fn check_is_past_utc(
    field: &'static str,
    value: DateTime<FixedOffset>,
) -> ValidationResult<DateTime<Utc>> {
    check_is_past_utc_at(field, value, Utc::now())
}

/// Require a zero UTC offset and a moment strictly before `now`
pub fn check_is_past_utc_at(
    field: &'static str,
    value: DateTime<FixedOffset>,
    now: DateTime<Utc>,
) -> ValidationResult<DateTime<Utc>> {
    if value.offset().local_minus_utc() != 0 {
        return Err(ValidationError::InvalidTimestamp {
            field,
            reason: "date must be an explicit UTC timestamp",
        });
    }

    let value = value.with_timezone(&Utc);
    if value >= now {
        return Err(ValidationError::InvalidTimestamp {
            field,
            reason: "date must be in the past",
        });
    }
    Ok(value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource counts
// ─────────────────────────────────────────────────────────────────────────────

/// Counts of dataset, policy and system manifests in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub datasets: i64,
    pub policies: i64,
    pub systems: i64,
}

/// Require all three count keys with integer values.
///
/// Partial objects are rejected, never defaulted. Unknown keys are ignored.
pub fn check_resource_counts(value: &serde_json::Value) -> ValidationResult<ResourceCounts> {
    let Some(object) = value.as_object() else {
        return Err(ValidationError::InvalidResourceCounts(
            "resource_counts must be an object".into(),
        ));
    };

    let mut counts = [0i64; 3];
    for (slot, key) in counts.iter_mut().zip(RESOURCE_COUNT_KEYS) {
        let raw = object.get(key).filter(|v| !v.is_null()).ok_or_else(|| {
            ValidationError::InvalidResourceCounts(format!(
                "resource_counts must include a \"{}\" key",
                key
            ))
        })?;
        *slot = raw.as_i64().ok_or_else(|| {
            ValidationError::InvalidResourceCounts(format!(
                "The value of resource_counts[\"{}\"] must be an integer",
                key
            ))
        })?;
    }

    let [datasets, policies, systems] = counts;
    Ok(ResourceCounts {
        datasets,
        policies,
        systems,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Flags and status codes
// ─────────────────────────────────────────────────────────────────────────────

/// Strip user-supplied values from CLI flags, keeping order.
///
/// `--name=secret` and `--name secret` both become `--name`.
pub fn check_flags<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .map(|flag| {
            let flag = flag.as_ref();
            match flag.find(FLAG_VALUE_DELIMITERS) {
                Some(idx) => flag[..idx].to_string(),
                None => flag.to_string(),
            }
        })
        .collect()
}

/// Require `status` whenever `condition` holds
pub fn check_status_required_if(condition: bool, status: Option<i64>) -> ValidationResult<()> {
    if condition && status.is_none() {
        return Err(ValidationError::MissingStatusCode);
    }
    Ok(())
}

/// An `error` needs a status code, and that code must not be 2xx
pub fn check_error_implies_failure_status(
    error: Option<&str>,
    status: Option<i64>,
) -> ValidationResult<()> {
    if error.is_none() {
        return Ok(());
    }
    match status {
        None => Err(ValidationError::MissingStatusCode),
        Some(code) if (200..=299).contains(&code) => Err(ValidationError::StatusIndicatesSuccess),
        Some(_) => Ok(()),
    }
}
