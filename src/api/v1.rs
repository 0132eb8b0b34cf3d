//! Endpoints for machine clients authenticated with an API key

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Extension, Json,
};
use std::sync::Arc;

use wg_shared::{ApiKey, AppError, JsonMessage, SecurityEvent, SecuritySettings};

use crate::api::models::{validated, EventsQuery, SecuritySettingsRequest};
use crate::api::security;
use crate::middleware::AuthenticatedKey;
use crate::state::AppState;

pub async fn whoami(Extension(AuthenticatedKey(api_key)): Extension<AuthenticatedKey>) -> Json<ApiKey> {
    Json(api_key)
}

pub async fn security_events(
    state: State<Arc<AppState>>,
    query: Query<EventsQuery>,
) -> Result<Json<Vec<SecurityEvent>>, AppError> {
    security::list_events(state, query).await
}

pub async fn get_security_settings(state: State<Arc<AppState>>) -> Result<Json<SecuritySettings>, AppError> {
    security::get_settings(state).await
}

pub async fn update_security_settings(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedKey(api_key)): Extension<AuthenticatedKey>,
    payload: Result<Json<SecuritySettingsRequest>, JsonRejection>,
) -> Result<Json<JsonMessage>, AppError> {
    let request = validated(payload)?;
    state.settings.update(request.into()).await?;
    tracing::info!(key_id = %api_key.id, "Security settings changed through API key");
    Ok(Json(JsonMessage::ok("Security settings updated successfully")))
}
