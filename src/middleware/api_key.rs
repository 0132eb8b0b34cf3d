// ============================================================================
// API KEY AUTHENTICATION & PERMISSIONS
// ============================================================================

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use wg_shared::{ApiAccessLog, ApiKey, AppError, Permission};

use crate::middleware::auth::bearer_token;
use crate::observability::record_api_key_auth;
use crate::state::AppState;
use crate::utils::{client_ip, user_agent, ClientIp};

/// Key attached to the request once its bearer token checks out
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub ApiKey);

/// Authenticates `Authorization: Bearer <api key>` and writes one access log
/// entry per authenticated call, carrying the final response status.
pub async fn authenticate_api_key(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let api_key = {
        let token = match bearer_token(request.headers()) {
            Ok(token) => token.to_string(),
            Err(e) => {
                record_api_key_auth("bad_header");
                warn!(path = %request.uri().path(), "API request rejected: {}", e);
                return e.into_response();
            }
        };

        match state.api_keys.authenticate(&token).await {
            Ok(api_key) => api_key,
            Err(e) => {
                record_api_key_auth(match e {
                    AppError::Authentication { .. } => "invalid",
                    AppError::Authorization { .. } => "disabled",
                    _ => "error",
                });
                warn!("API request rejected: {}", e);
                return e.into_response();
            }
        }
    };
    record_api_key_auth("success");

    let ip = match request.extensions().get::<ClientIp>() {
        Some(ip) => ip.0.clone(),
        None => client_ip(&request, state.config.server.trust_proxy),
    };
    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();
    let agent = user_agent(request.headers());
    let (api_key_id, api_key_name) = (api_key.id, api_key.name.clone());

    debug!(key_id = %api_key_id, endpoint = %endpoint, "🔑 API key authenticated");
    request.extensions_mut().insert(AuthenticatedKey(api_key));

    let response = next.run(request).await;

    state
        .api_keys
        .record_access(ApiAccessLog {
            id: Uuid::new_v4(),
            api_key_id,
            api_key_name,
            endpoint,
            method,
            ip_address: ip,
            user_agent: agent,
            status_code: response.status().as_u16(),
            timestamp: Utc::now(),
        })
        .await;

    response
}

/// Route layer requiring an exact permission on the authenticated key:
/// `from_fn_with_state(Permission::ReadStats, require_permission)`
pub async fn require_permission(
    State(permission): State<Permission>,
    request: Request,
    next: Next,
) -> Response {
    let (allowed, key_id) = match request.extensions().get::<AuthenticatedKey>() {
        Some(AuthenticatedKey(key)) => (key.has_permission(permission), key.id),
        None => return AppError::authorization("API key context not found").into_response(),
    };

    if !allowed {
        record_api_key_auth("forbidden");
        warn!(key_id = %key_id, permission = %permission, "API key lacks permission");
        return AppError::authorization(format!(
            "API key does not have required permission: {}",
            permission
        ))
        .into_response();
    }

    next.run(request).await
}
