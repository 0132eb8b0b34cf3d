// ============================================================================
// API KEY ADMIN ENDPOINTS
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use std::sync::Arc;

use wg_shared::{ApiAccessLog, ApiKey, AppError, JsonMessage};

use crate::api::models::{
    list_limit, parse_id, parse_permissions, validated, CreateApiKeyRequest, CreateApiKeyResponse,
    LogsQuery, UpdateApiKeyRequest,
};
use crate::services::api_key_service::ApiStatistics;
use crate::services::{ApiKeyChanges, NewApiKey};
use crate::state::AppState;

/// All keys. The stored digest is never part of the output.
pub async fn list_api_keys(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ApiKey>>, AppError> {
    Ok(Json(state.api_keys.list().await?))
}

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> Result<Json<CreateApiKeyResponse>, AppError> {
    let request = validated(payload)?;
    let permissions = parse_permissions(&request.permissions)?;

    let issued = state
        .api_keys
        .create(NewApiKey {
            name: request.name,
            permissions,
        })
        .await?;

    Ok(Json(CreateApiKeyResponse {
        success: true,
        message: "API key created successfully".to_string(),
        api_key: issued.api_key,
        raw_key: issued.raw_key,
    }))
}

pub async fn update_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateApiKeyRequest>, JsonRejection>,
) -> Result<Json<JsonMessage>, AppError> {
    let id = parse_id(&id)?;
    let request = validated(payload)?;
    let permissions = parse_permissions(&request.permissions)?;

    state
        .api_keys
        .update(
            id,
            ApiKeyChanges {
                name: request.name,
                permissions,
                enabled: request.enabled,
            },
        )
        .await?;

    Ok(Json(JsonMessage::ok("API key updated successfully")))
}

pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JsonMessage>, AppError> {
    state.api_keys.delete(parse_id(&id)?).await?;
    Ok(Json(JsonMessage::ok("API key deleted successfully")))
}

pub async fn api_statistics(State(state): State<Arc<AppState>>) -> Result<Json<ApiStatistics>, AppError> {
    Ok(Json(state.api_keys.statistics().await?))
}

pub async fn api_key_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ApiAccessLog>>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.api_keys.access_logs(id, list_limit(query.limit)).await?))
}
