//! Admin session tokens (HS256 JWT)

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use wg_shared::config::AuthConfig;
use wg_shared::AppError;

use crate::services::api_key_service::generate_raw_key;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // admin username
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = match &config.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!("⚠️ JWT_SECRET not set, admin sessions will not survive a restart");
                generate_raw_key()
            }
        };

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(config.session_ttl_hours),
        }
    }

    pub fn issue(&self, username: &str) -> Result<SessionToken, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: username.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to generate session token: {}", e)))?;

        Ok(SessionToken {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl.num_seconds(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::authentication("Session expired"),
                _ => AppError::authentication("Invalid session token"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            admin_username: "admin".to_string(),
            admin_password_hash: None,
            jwt_secret: Some(secret.to_string()),
            session_ttl_hours: 12,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let sessions = SessionService::new(&config("secret"));
        let token = sessions.issue("admin").unwrap();
        assert_eq!(token.expires_in, 12 * 3600);
        assert_eq!(sessions.verify(&token.token).unwrap().sub, "admin");
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let token = SessionService::new(&config("one")).issue("admin").unwrap();
        let err = SessionService::new(&config("two")).verify(&token.token).unwrap_err();
        assert!(matches!(err, AppError::Authentication { .. }));
    }
}
