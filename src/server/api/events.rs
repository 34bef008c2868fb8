// Events endpoint - validates and stores one analytics event per request

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use super::with_storage;
use crate::schema::{AnalyticsEvent, EventPayload, Submission};
use crate::server::error::ApiError;
use crate::server::state::AppState;

/// POST /events
///
/// Echoes the accepted event with its endpoint reduced to method and path.
pub async fn create_event(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<EventPayload>), ApiError> {
    let Json(body) = body?;
    let event = AnalyticsEvent::from_json(body)?;
    let echo = event.truncated_payload();

    let submission = Submission::Event(event);
    with_storage(&state.storage, move |storage| storage.persist(&submission)).await?;

    Ok((StatusCode::CREATED, Json(echo)))
}
