// ============================================================================
// CONSOLE HTTP API
// ============================================================================
// Route tables by audience. Every path is prefixed with BASE_PATH.
// ============================================================================

pub mod api_keys;
pub mod auth;
pub mod health;
pub mod models;
pub mod security;
pub mod v1;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use wg_shared::{Config, Permission};

use crate::middleware::{authenticate_api_key, require_admin, require_permission};
use crate::observability::metrics_handler;
use crate::state::AppState;

/// Health check, metrics and login. No caller authentication.
pub fn public_routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route(&config.health_path(), get(health::health_check))
        .route(&config.route("/metrics"), get(metrics_handler))
        .route(&config.login_path(), post(auth::login))
}

/// Console management endpoints behind an admin session
pub fn admin_routes(config: &Config, state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &config.route("/security/settings"),
            get(security::get_settings).put(security::update_settings),
        )
        .route(&config.route("/security/events"), get(security::list_events))
        .route(&config.route("/security/statistics"), get(security::statistics))
        .route(
            &config.route("/security/ip-blocks"),
            get(security::list_ip_blocks).post(security::create_ip_block),
        )
        .route(&config.route("/security/ip-blocks/:id"), delete(security::delete_ip_block))
        .route(
            &config.route("/security/geoip-rules"),
            get(security::list_geoip_rules).post(security::create_geoip_rule),
        )
        .route(&config.route("/security/geoip-rules/:id"), delete(security::delete_geoip_rule))
        .route(
            &config.route("/api-keys"),
            get(api_keys::list_api_keys).post(api_keys::create_api_key),
        )
        .route(&config.route("/api-keys/statistics"), get(api_keys::api_statistics))
        .route(
            &config.route("/api-keys/:id"),
            put(api_keys::update_api_key).delete(api_keys::delete_api_key),
        )
        .route(&config.route("/api-keys/:id/logs"), get(api_keys::api_key_logs))
        .route_layer(from_fn_with_state(state, require_admin))
}

/// `/api/v1` endpoints. Authentication wraps every route; each route then
/// checks its own permission.
pub fn api_v1_routes(config: &Config, state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(&config.route("/api/v1/whoami"), get(v1::whoami))
        .route(
            &config.route("/api/v1/security/events"),
            get(v1::security_events)
                .route_layer(from_fn_with_state(Permission::ReadStats, require_permission)),
        )
        .route(
            &config.route("/api/v1/server/security-settings"),
            get(v1::get_security_settings)
                .route_layer(from_fn_with_state(Permission::ReadServer, require_permission))
                .merge(
                    put(v1::update_security_settings)
                        .route_layer(from_fn_with_state(Permission::WriteServer, require_permission)),
                ),
        )
        .route_layer(from_fn_with_state(state, authenticate_api_key))
}
