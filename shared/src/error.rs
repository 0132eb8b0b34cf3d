//! Error handling for the console and its access-gating pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::types::JsonMessage;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Configuration unavailable: {message}")]
    ConfigUnavailable { message: String },

    #[error("Lookup failure: {message}")]
    Lookup { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Authorization error: {message}")]
    Authorization { message: String },

    /// Active IP block or blocked country
    #[error("Access denied: {message}")]
    Blocked { message: String },

    /// Brute-force lockout
    #[error("Locked out: {message}")]
    Locked { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn config_unavailable(message: impl Into<String>) -> Self {
        Self::ConfigUnavailable {
            message: message.into(),
        }
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked {
            message: message.into(),
        }
    }

    pub fn locked(message: impl Into<String>) -> Self {
        Self::Locked {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            AppError::Authorization { .. } => StatusCode::FORBIDDEN,
            AppError::Blocked { .. } => StatusCode::FORBIDDEN,
            AppError::Locked { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::ConfigUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Lookup { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Authentication { .. } => "AUTH_ERROR",
            AppError::Authorization { .. } => "AUTHZ_ERROR",
            AppError::Blocked { .. } => "ACCESS_DENIED",
            AppError::Locked { .. } => "LOCKED_OUT",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::ConfigUnavailable { .. } => "CONFIG_UNAVAILABLE",
            AppError::Lookup { .. } => "LOOKUP_FAILURE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Store { .. } => "STORE_ERROR",
            AppError::Internal { .. } => "INTERNAL_ERROR",
            AppError::Generic(_) => "GENERIC_ERROR",
        }
    }

    /// Message safe to hand to the client. Backend failures are not echoed.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation { message }
            | AppError::Authentication { message }
            | AppError::Authorization { message }
            | AppError::Blocked { message }
            | AppError::Locked { message } => message.clone(),
            AppError::NotFound { resource } => format!("{} not found", resource),
            AppError::ConfigUnavailable { .. } => "Service temporarily unavailable".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("API Error: {} - {}", self.error_code(), self);
        } else {
            tracing::debug!("API Error: {} - {}", self.error_code(), self);
        }

        (status, Json(JsonMessage::failure(self.public_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::authentication("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::authorization("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::blocked("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::locked("x").status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_backend_errors_are_not_echoed() {
        let err = AppError::store("connection refused to 10.1.2.3:5432");
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(AppError::locked("slow down").public_message(), "slow down");
    }
}
