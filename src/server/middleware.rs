//! Request middleware: access log, rate limiting, version header

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::{rate_limit_headers, ApiError};
use super::state::AppState;

/// Log method, path, status and latency once the response is ready
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Client key for rate limiting: peer IP, or "unknown" without connection info
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let decision = state.limiter.check(&client_key(&request));
    if !decision.allowed {
        return ApiError::RateLimited {
            limit: state.limiter.limit(),
            decision,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().extend(rate_limit_headers(&decision));
    response
}

/// Reject requests that do not identify the SDK version
pub async fn require_version_header(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !request.headers().contains_key(&state.version_header) {
        return Err(ApiError::MissingHeader);
    }
    Ok(next.run(request).await)
}
