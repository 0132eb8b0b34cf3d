use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use wg_shared::AppError;

use crate::state::AppState;

/// Administrator authenticated by a session token
#[derive(Debug, Clone)]
pub struct CurrentAdmin {
    pub username: String,
}

/// Token part of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::authentication("Missing Authorization header"))?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::authentication("Invalid Authorization header format"))
}

/// Guards the admin management endpoints with the session token issued at login
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = {
        let token = bearer_token(request.headers()).map_err(|e| {
            warn!("Admin request rejected: {}", e);
            e
        })?;
        state.sessions.verify(token)?
    };

    debug!(admin = %claims.sub, "🔐 Admin session accepted");
    request.extensions_mut().insert(CurrentAdmin { username: claims.sub });

    Ok(next.run(request).await)
}
