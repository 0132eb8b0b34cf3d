// ============================================================================
// ACCESS GATE - ordered IP block, GeoIP and lockout checks for every request
// ============================================================================

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use wg_shared::{AppError, SecurityEvent, SecurityEventType};

use crate::observability::record_gate_denial;
use crate::services::GeoDecision;
use crate::state::AppState;
use crate::utils::{client_ip, ClientIp};

pub const ACCESS_DENIED: &str = "Access denied";
pub const REGION_DENIED: &str = "Access denied from your region";
pub const LOCKED_OUT: &str = "Too many login attempts. Please try again later.";

/// Runs the gate checks for one request.
///
/// Order is fixed: IP block, then GeoIP, then login lockout. The first denial
/// wins and comes back as the error to render, after its security event has
/// been recorded. Collaborator failures let the request through.
pub async fn evaluate_request(
    state: &AppState,
    ip: &str,
    method: &Method,
    path: &str,
) -> Result<(), AppError> {
    let settings = match state.settings.get().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(ip = %ip, path = %path, error = %e, "⚠️ Security settings unavailable, skipping checks");
            return Ok(());
        }
    };

    if settings.ip_blocking_enabled {
        match state.ip_blocks.is_blocked(ip).await {
            Ok(true) => {
                warn!(ip = %ip, path = %path, "🚫 Request from blocked IP denied");
                record_gate_denial("blocked_ip");
                state
                    .events
                    .record(SecurityEvent::new(
                        SecurityEventType::BlockedIp,
                        ip,
                        format!("Blocked IP {} attempted to access {}", ip, path),
                    ))
                    .await;
                return Err(AppError::blocked(ACCESS_DENIED));
            }
            Ok(false) => {}
            Err(e) => warn!(ip = %ip, error = %e, "⚠️ IP block check failed, allowing request"),
        }
    }

    if settings.geoip_enabled {
        if let GeoDecision::Block { country } = state.geoip.evaluate(ip, &settings).await {
            warn!(ip = %ip, country = %country, path = %path, "🌍 Request from blocked country denied");
            record_gate_denial("blocked_geoip");
            state
                .events
                .record(
                    SecurityEvent::new(
                        SecurityEventType::BlockedGeoip,
                        ip,
                        format!("Request from {} ({}) to {} blocked by GeoIP rule", ip, country, path),
                    )
                    .country(&country),
                )
                .await;
            return Err(AppError::blocked(REGION_DENIED));
        }
    }

    if settings.brute_force_enabled && *method == Method::POST && path == state.config.login_path() {
        match state.brute_force.locked_until(ip).await {
            Ok(Some(until)) => {
                warn!(ip = %ip, blocked_until = %until, "🔒 Login attempt from locked IP denied");
                record_gate_denial("brute_force");
                state
                    .events
                    .record(SecurityEvent::new(
                        SecurityEventType::BruteForce,
                        ip,
                        format!(
                            "Brute force blocked IP {} (blocked until {})",
                            ip,
                            until.to_rfc3339()
                        ),
                    ))
                    .await;
                return Err(AppError::locked(LOCKED_OUT));
            }
            Ok(None) => {}
            Err(e) => warn!(ip = %ip, error = %e, "⚠️ Lockout check failed, allowing request"),
        }
    }

    Ok(())
}

/// Outermost gate layer. Attaches the resolved [`ClientIp`] to requests it lets through.
pub async fn access_gate_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if path == state.config.health_path() {
        return next.run(request).await;
    }

    let ip = client_ip(&request, state.config.server.trust_proxy);
    let method = request.method().clone();

    if let Err(denial) = evaluate_request(&state, &ip, &method, &path).await {
        return denial.into_response();
    }

    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}
