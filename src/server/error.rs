//! API error responses
//!
//! Every failure leaves the collector as `{"error": "<message>"}`. Storage
//! details are logged here and replaced with a generic message.

use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use super::rate_limit::{Decision, RateLimit};
use crate::error::ValidationError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    /// A rule rejected the payload
    Validation(ValidationError),
    /// Body or query could not be decoded
    Malformed(String),
    MissingHeader,
    NotFound,
    Conflict(String),
    /// Logged in full, answered generically
    Internal(String),
    RateLimited { limit: RateLimit, decision: Decision },
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound,
            StorageError::Conflict(client_id) => ApiError::Conflict(client_id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

/// `X-RateLimit-*` headers for a decision
pub(crate) fn rate_limit_headers(decision: &Decision) -> HeaderMap {
    let reset_at = Utc::now()
        + chrono::Duration::from_std(round_up(decision.reset_after))
            .unwrap_or_else(|_| chrono::Duration::zero());

    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at.timestamp()));
    if !decision.allowed {
        let http_date = reset_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert("retry-after", value);
        }
    }
    headers
}

/// Whole seconds, rounding partial seconds up
fn round_up(duration: Duration) -> Duration {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    Duration::from_secs(secs)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(err) => {
                tracing::debug!(rule = err.rule(), "Rejected payload: {}", err.log_text());
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ApiError::Malformed(msg) => {
                // msg may quote submitted values
                tracing::debug!(rule = "malformed", "Malformed request");
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            ApiError::MissingHeader => (
                StatusCode::BAD_REQUEST,
                "Missing required header(s)".to_string(),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Conflict(client_id) => {
                tracing::debug!(client_id = %client_id, "Duplicate registration");
                (
                    StatusCode::CONFLICT,
                    "A registration for this client_id already exists".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!("API error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::RateLimited { limit, decision } => {
                tracing::warn!(limit = %limit, "Rate limit exceeded");
                let body = Json(json!({ "error": format!("Rate limit exceeded: {limit}") }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    rate_limit_headers(&decision),
                    body,
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
