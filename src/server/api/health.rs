use axum::Json;
use serde_json::{json, Value};

/// GET /health - liveness check, no version header needed
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
