use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use wg_shared::AppError;

use crate::api::models::{validated, LoginRequest, LoginResponse};
use crate::state::AppState;
use crate::utils::ClientIp;

/// Console login. Every rejected credential pair counts toward the
/// brute-force lockout of the caller's IP; a success clears it.
pub async fn login(
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let ip = client_ip
        .map(|Extension(ip)| ip.0)
        .unwrap_or_else(|| "unknown".to_string());
    let request = validated(payload)?;

    if !state
        .credentials
        .verify(&request.username, &request.password)
        .await
    {
        warn!(ip = %ip, username = %request.username, "❌ Failed console login");
        state
            .brute_force
            .record_failure(&ip, Some(&request.username))
            .await;
        return Err(AppError::authentication("Invalid credentials"));
    }

    state.brute_force.clear_on_success(&ip).await;
    let session = state.sessions.issue(&request.username)?;

    info!(ip = %ip, username = %request.username, "✅ Console login");
    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token: session.token,
        token_type: session.token_type,
        expires_in: session.expires_in,
    }))
}
