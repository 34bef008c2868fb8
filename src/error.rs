//! Validation error taxonomy shared by the SDK and the collector

use thiserror::Error;

/// A rejected event or registration payload.
///
/// Validation is fail-fast, so one value describes the first rule that
/// failed. The `Display` text is what callers (and HTTP clients) see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or null
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A required text field was present but blank
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// An identifier looks like an email address
    #[error("{0} must not be identifiable")]
    NotIdentifiable(&'static str),

    /// A timestamp is unparseable, not UTC, or not in the past
    #[error("{field}: {reason}")]
    InvalidTimestamp {
        field: &'static str,
        reason: &'static str,
    },

    /// `endpoint` is not `<METHOD>: <url>`
    #[error("{0}")]
    InvalidEndpoint(String),

    /// `resource_counts` is partial or carries non-integer values
    #[error("{0}")]
    InvalidResourceCounts(String),

    /// `endpoint` was supplied without `local_host`
    #[error("local_host must be provided")]
    MissingLocalHost,

    /// `command`, `endpoint` or `error` was supplied without `status_code`
    #[error("status_code must be provided")]
    MissingStatusCode,

    /// `error` was supplied alongside a 2xx status code
    #[error("An error was provided, but the provided status_code indicates success")]
    StatusIndicatesSuccess,

    /// `email` is not a usable address
    #[error("email must contain a valid email address")]
    InvalidEmail,

    /// The JSON body does not have the expected shape
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Short machine-readable name of the failed rule
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "required",
            ValidationError::EmptyField(_) => "not_empty",
            ValidationError::NotIdentifiable(_) => "not_identifiable",
            ValidationError::InvalidTimestamp { .. } => "past_utc_timestamp",
            ValidationError::InvalidEndpoint(_) => "endpoint_format",
            ValidationError::InvalidResourceCounts(_) => "resource_counts",
            ValidationError::MissingLocalHost => "local_host_required",
            ValidationError::MissingStatusCode => "status_code_required",
            ValidationError::StatusIndicatesSuccess => "error_implies_failure_status",
            ValidationError::InvalidEmail => "email",
            ValidationError::Malformed(_) => "malformed",
        }
    }
}

impl ValidationError {
    /// Text safe for logs. Serde's message can quote the submitted value,
    /// so a malformed payload is logged by rule name only.
    pub fn log_text(&self) -> String {
        match self {
            ValidationError::Malformed(_) => self.rule().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::Malformed(err.to_string())
    }
}

/// Result type alias for validation
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
