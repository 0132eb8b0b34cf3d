use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};

use wg_shared::AppError;

/// `BASE_PATH/metrics` in the Prometheus text format. Not behind a session,
/// but still subject to the access gate like every other path.
pub async fn metrics_handler() -> Result<Response, AppError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| AppError::internal(format!("failed to encode metrics: {}", e)))?;

    let mut response = buffer.into_response();
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}
