//! Console administrator credential checks

use async_trait::async_trait;
use tracing::{error, warn};

use wg_shared::config::AuthConfig;

#[async_trait]
pub trait CredentialVerifier: Send + Sync + 'static {
    async fn verify(&self, username: &str, password: &str) -> bool;
}

/// Single administrator with a bcrypt password hash
pub struct BcryptCredentialVerifier {
    username: String,
    password_hash: Option<String>,
}

impl BcryptCredentialVerifier {
    pub fn new(username: impl Into<String>, password_hash: Option<String>) -> Self {
        Self {
            username: username.into(),
            password_hash,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        if config.admin_password_hash.is_none() {
            warn!("⚠️ ADMIN_PASSWORD_HASH not set, every console login will fail");
        }
        Self::new(config.admin_username.clone(), config.admin_password_hash.clone())
    }
}

#[async_trait]
impl CredentialVerifier for BcryptCredentialVerifier {
    async fn verify(&self, username: &str, password: &str) -> bool {
        let Some(hash) = self.password_hash.clone() else {
            return false;
        };
        if username != self.username {
            return false;
        }

        let password = password.to_string();
        match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
            Ok(Ok(valid)) => valid,
            Ok(Err(e)) => {
                error!("Stored admin password hash is unusable: {}", e);
                false
            }
            Err(e) => {
                error!("Password verification task failed: {}", e);
                false
            }
        }
    }
}
