use thiserror::Error;

use crate::error::ValidationError;

/// Errors surfaced to SDK callers
#[derive(Error, Debug)]
pub enum ClientError {
    /// A required client setting was empty or unusable
    #[error("Failed to initialize AnalyticsClient: {0}")]
    InvalidClient(String),

    /// The event or registration failed pre-flight validation
    #[error("Failed to initialize AnalyticsEvent: {0}")]
    InvalidEvent(#[from] ValidationError),

    /// Connection refused, DNS failure or timeout
    #[error("The analytics server is unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-2xx status
    #[error("The analytics server responded with an error: {status} {message}")]
    Send { status: u16, message: String },

    #[error("Unknown error while sending analytics: {0}")]
    Unknown(String),
}

impl ClientError {
    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Send { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ClientError::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Send {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            }
        } else {
            ClientError::Unknown(err.to_string())
        }
    }
}
