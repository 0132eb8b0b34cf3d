// ============================================================================
// API MODELS - request and response bodies of the console endpoints
// ============================================================================

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use wg_shared::{ApiKey, AppError, GeoIpAction, Permission, SecuritySettings};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Unwraps a JSON body and runs its validation rules, mapping both kinds of
/// failure onto a 400 with the standard `{success, message}` body
pub fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    let Json(body) = payload.map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        AppError::validation("Invalid request data")
    })?;
    body.validate().map_err(validation_error)?;
    Ok(body)
}

fn validation_error(errors: ValidationErrors) -> AppError {
    let message = errors
        .field_errors()
        .into_values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid request data".to_string());
    AppError::validation(message)
}

pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation(format!("Invalid id '{}'", raw)))
}

pub fn list_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

pub fn parse_permissions(raw: &[String]) -> Result<Vec<Permission>, AppError> {
    raw.iter().map(|p| p.trim().parse::<Permission>()).collect()
}

// ============================================================================
// LOGIN
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

// ============================================================================
// SECURITY SETTINGS
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SecuritySettingsRequest {
    pub brute_force_enabled: bool,

    #[validate(range(min = 1, message = "brute_force_max_attempts must be at least 1"))]
    pub brute_force_max_attempts: u32,

    #[validate(range(min = 1, message = "brute_force_window_minutes must be at least 1"))]
    pub brute_force_window_minutes: u32,

    #[validate(range(min = 1, message = "brute_force_block_minutes must be at least 1"))]
    pub brute_force_block_minutes: u32,

    pub ip_blocking_enabled: bool,
    pub geoip_enabled: bool,
    pub geoip_default_action: GeoIpAction,
}

impl From<SecuritySettingsRequest> for SecuritySettings {
    fn from(req: SecuritySettingsRequest) -> Self {
        SecuritySettings {
            brute_force_enabled: req.brute_force_enabled,
            brute_force_max_attempts: req.brute_force_max_attempts,
            brute_force_window_minutes: req.brute_force_window_minutes,
            brute_force_block_minutes: req.brute_force_block_minutes,
            ip_blocking_enabled: req.ip_blocking_enabled,
            geoip_enabled: req.geoip_enabled,
            geoip_default_action: req.geoip_default_action,
            updated_at: chrono::Utc::now(),
        }
    }
}

// ============================================================================
// EVENTS & LOGS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// IP BLOCKS & GEOIP RULES
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIpBlockRequest {
    #[validate(length(min = 1, message = "IP address is required"))]
    pub ip: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub permanent: bool,

    #[serde(default)]
    #[validate(range(max = 87600, message = "Block duration cannot exceed 87600 hours"))]
    pub hours: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGeoIpRuleRequest {
    #[validate(length(min = 1, message = "Country code and action are required"))]
    pub country_code: String,

    #[serde(default)]
    pub country_name: String,

    #[validate(length(min = 1, message = "Country code and action are required"))]
    pub action: String,
}

// ============================================================================
// API KEYS
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, message = "API key name is required"))]
    pub name: String,

    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateApiKeyRequest {
    #[validate(length(min = 1, message = "API key name is required"))]
    pub name: String,

    #[serde(default)]
    pub permissions: Vec<String>,

    pub enabled: bool,
}

/// The only response that ever carries a raw key
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    pub success: bool,
    pub message: String,
    pub api_key: ApiKey,
    pub raw_key: String,
}
