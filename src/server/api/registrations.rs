// Registrations endpoints - opt-in contact records keyed by client_id

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::with_storage;
use crate::schema::{Registration, RegistrationPayload, Submission};
use crate::server::error::ApiError;
use crate::server::state::AppState;

const MAX_PAGE: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// POST /registrations
pub async fn create_registration(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationPayload>), ApiError> {
    let Json(body) = body?;
    let registration = Registration::from_json(body)?;
    let echo = registration.to_payload();

    let submission = Submission::Registration(registration);
    with_storage(&state.storage, move |storage| storage.persist(&submission)).await?;

    Ok((StatusCode::CREATED, Json(echo)))
}

/// PATCH /registrations
///
/// Replaces email and organization for an existing client_id.
pub async fn update_registration(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RegistrationPayload>, ApiError> {
    let Json(body) = body?;
    let registration = Registration::from_json(body)?;

    let stored = with_storage(&state.storage, move |storage| {
        storage.update_registration(&registration)
    })
    .await?;

    Ok(Json(stored.to_payload()))
}

/// DELETE /registrations/:client_id
pub async fn delete_registration(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    with_storage(&state.storage, move |storage| {
        storage.delete_registration(&client_id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /registrations?limit=&offset= - newest first, limit capped at 500
pub async fn list_registrations(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<RegistrationPayload>>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.min(MAX_PAGE);

    let registrations = with_storage(&state.storage, move |storage| {
        storage.list_registrations(limit, query.offset)
    })
    .await?;

    Ok(Json(
        registrations.iter().map(Registration::to_payload).collect(),
    ))
}
