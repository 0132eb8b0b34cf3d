use axum::{middleware as axum_middleware, response::IntoResponse, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod middleware;
pub mod observability;
pub mod security;
pub mod services;
pub mod state;
pub mod store;
pub mod tasks;
pub mod utils;

use middleware::access_gate_middleware;
use observability::metrics_middleware;
use security::{get_cors_layer, security_headers_middleware};
use state::AppState;
use wg_shared::AppError;

async fn not_found() -> impl IntoResponse {
    AppError::not_found("Resource")
}

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    let config = app_state.config.clone();

    Router::new()
        .merge(api::public_routes(&config))
        .merge(api::admin_routes(&config, app_state.clone()))
        .merge(api::api_v1_routes(&config, app_state.clone()))
        // The fallback must be registered before the gate so unknown paths are gated too
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            access_gate_middleware,
        ))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(get_cors_layer(&config.server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
