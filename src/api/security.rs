// ============================================================================
// SECURITY ADMIN ENDPOINTS - settings, audit events, IP blocks, GeoIP rules
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;

use wg_shared::{AppError, GeoIpAction, GeoIpRule, IpBlock, JsonMessage, SecurityEvent, SecurityEventType, SecuritySettings};

use crate::api::models::{
    list_limit, parse_id, validated, CreateGeoIpRuleRequest, CreateIpBlockRequest, EventsQuery,
    SecuritySettingsRequest,
};
use crate::middleware::CurrentAdmin;
use crate::services::security_event_service::SecurityStatistics;
use crate::services::{NewGeoIpRule, NewIpBlock};
use crate::state::AppState;

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Result<Json<SecuritySettings>, AppError> {
    Ok(Json(state.settings.get().await?))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SecuritySettingsRequest>, JsonRejection>,
) -> Result<Json<JsonMessage>, AppError> {
    let request = validated(payload)?;
    state.settings.update(request.into()).await?;
    Ok(Json(JsonMessage::ok("Security settings updated successfully")))
}

/// Recent events, newest first, optionally narrowed to one event type
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<SecurityEvent>>, AppError> {
    let event_type = query
        .event_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::parse::<SecurityEventType>)
        .transpose()?;

    Ok(Json(state.events.recent(list_limit(query.limit), event_type).await?))
}

pub async fn statistics(State(state): State<Arc<AppState>>) -> Result<Json<SecurityStatistics>, AppError> {
    Ok(Json(state.events.statistics().await?))
}

pub async fn list_ip_blocks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<IpBlock>>, AppError> {
    Ok(Json(state.ip_blocks.list().await?))
}

pub async fn create_ip_block(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentAdmin>,
    payload: Result<Json<CreateIpBlockRequest>, JsonRejection>,
) -> Result<Json<JsonMessage>, AppError> {
    let request = validated(payload)?;
    state
        .ip_blocks
        .create(
            NewIpBlock {
                ip: request.ip,
                reason: request.reason,
                permanent: request.permanent,
                hours: request.hours,
            },
            &admin.username,
        )
        .await?;

    Ok(Json(JsonMessage::ok("IP blocked successfully")))
}

pub async fn delete_ip_block(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> Result<Json<JsonMessage>, AppError> {
    state.ip_blocks.delete(parse_id(&id)?, &admin.username).await?;
    Ok(Json(JsonMessage::ok("IP block removed successfully")))
}

pub async fn list_geoip_rules(State(state): State<Arc<AppState>>) -> Result<Json<Vec<GeoIpRule>>, AppError> {
    Ok(Json(state.geoip.list().await?))
}

pub async fn create_geoip_rule(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentAdmin>,
    payload: Result<Json<CreateGeoIpRuleRequest>, JsonRejection>,
) -> Result<Json<JsonMessage>, AppError> {
    let request = validated(payload)?;
    let action: GeoIpAction = request.action.trim().parse()?;

    state
        .geoip
        .create(
            NewGeoIpRule {
                country_code: request.country_code,
                country_name: request.country_name,
                action,
            },
            &admin.username,
        )
        .await?;

    Ok(Json(JsonMessage::ok("GeoIP rule created successfully")))
}

pub async fn delete_geoip_rule(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentAdmin>,
    Path(id): Path<String>,
) -> Result<Json<JsonMessage>, AppError> {
    state.geoip.delete(parse_id(&id)?, &admin.username).await?;
    Ok(Json(JsonMessage::ok("GeoIP rule removed successfully")))
}
