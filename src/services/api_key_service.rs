// ============================================================================
// API KEY SERVICE - key generation, digesting, lookup and access logging
// ============================================================================

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use wg_shared::{ApiAccessLog, ApiKey, AppError, Permission};

use crate::services::clock::Clock;
use crate::store::SecurityStore;

const RAW_KEY_BYTES: usize = 32;
const KEY_PREFIX_LEN: usize = 8;

/// Number of recent access logs the statistics endpoint returns
pub const ACCESS_LOG_WINDOW: usize = 1000;

/// 32 random bytes from the OS, hex encoded
pub fn generate_raw_key() -> String {
    let mut bytes = [0u8; RAW_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One-way digest stored in place of the raw key. Creation and
/// authentication must both go through here.
pub fn digest_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    pub permissions: Vec<Permission>,
}

/// Full replacement of the editable fields
#[derive(Debug, Clone)]
pub struct ApiKeyChanges {
    pub name: String,
    pub permissions: Vec<Permission>,
    pub enabled: bool,
}

/// A freshly created key. `raw_key` exists only here.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub api_key: ApiKey,
    pub raw_key: String,
}

#[derive(Debug, Serialize)]
pub struct ApiStatistics {
    pub logs: Vec<ApiAccessLog>,
    pub api_keys: Vec<ApiKey>,
    pub log_count: usize,
}

#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, request: NewApiKey) -> Result<IssuedApiKey, AppError> {
        let name = required_name(&request.name)?;
        let raw_key = generate_raw_key();
        let now = self.clock.now();

        let api_key = ApiKey {
            id: Uuid::new_v4(),
            name,
            key: digest_key(&raw_key),
            key_prefix: raw_key[..KEY_PREFIX_LEN].to_string(),
            permissions: permission_strings(&request.permissions),
            enabled: true,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        };
        self.store.save_api_key(&api_key).await?;

        info!(key_id = %api_key.id, name = %api_key.name, "🔑 API key created");
        Ok(IssuedApiKey { api_key, raw_key })
    }

    pub async fn update(&self, id: Uuid, changes: ApiKeyChanges) -> Result<ApiKey, AppError> {
        let name = required_name(&changes.name)?;
        let mut api_key = self
            .store
            .get_api_key_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("API key"))?;

        api_key.name = name;
        api_key.permissions = permission_strings(&changes.permissions);
        api_key.enabled = changes.enabled;
        api_key.updated_at = self.clock.now();
        self.store.save_api_key(&api_key).await?;

        info!(key_id = %api_key.id, enabled = api_key.enabled, "🔑 API key updated");
        Ok(api_key)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.store.delete_api_key(id).await?;
        info!(key_id = %id, "🔑 API key deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ApiKey>, AppError> {
        Ok(self.store.get_api_keys().await?)
    }

    /// Resolves a bearer token to its key.
    ///
    /// Unknown tokens are an authentication failure and disabled keys an
    /// authorization failure. A store error never yields a key.
    pub async fn authenticate(&self, token: &str) -> Result<ApiKey, AppError> {
        let api_key = self
            .store
            .get_api_key_by_key(&digest_key(token))
            .await
            .map_err(|e| {
                warn!(error = %e, "⚠️ API key lookup failed, rejecting request");
                AppError::config_unavailable(e.to_string())
            })?
            .ok_or_else(|| AppError::authentication("Invalid API key"))?;

        if !api_key.enabled {
            return Err(AppError::authorization("API key is disabled"));
        }

        if let Err(e) = self.store.touch_api_key(api_key.id, self.clock.now()).await {
            warn!(key_id = %api_key.id, error = %e, "⚠️ Failed to update API key last use");
        }

        Ok(api_key)
    }

    /// Appends an access log entry. Failures are logged and swallowed.
    pub async fn record_access(&self, mut log: ApiAccessLog) {
        log.timestamp = self.clock.now();
        if let Err(e) = self.store.save_api_access_log(&log).await {
            warn!(key_id = %log.api_key_id, error = %e, "⚠️ Failed to persist API access log");
        }
    }

    pub async fn access_logs(&self, id: Uuid, limit: usize) -> Result<Vec<ApiAccessLog>, AppError> {
        Ok(self.store.get_api_access_logs_by_key_id(id, limit).await?)
    }

    pub async fn statistics(&self) -> Result<ApiStatistics, AppError> {
        let logs = self.store.get_api_access_logs(ACCESS_LOG_WINDOW).await?;
        let api_keys = self.store.get_api_keys().await?;
        Ok(ApiStatistics {
            log_count: logs.len(),
            logs,
            api_keys,
        })
    }
}

fn required_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("API key name is required"));
    }
    Ok(name.to_string())
}

fn permission_strings(permissions: &[Permission]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(permissions.len());
    for permission in permissions {
        let permission = permission.as_str().to_string();
        if !out.contains(&permission) {
            out.push(permission);
        }
    }
    out
}
