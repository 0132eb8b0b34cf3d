use axum::Json;
use serde_json::{json, Value};

/// Liveness probe. Served outside the access gate.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
