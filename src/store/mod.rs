// ============================================================================
// SECURITY STORE - persistence contract for the access-gating pipeline
// ============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use wg_shared::{
    ApiAccessLog, ApiKey, AppError, BruteForceAttempt, GeoIpRule, IpBlock, SecurityEvent,
    SecurityEventType, SecuritySettings,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable")]
    Unavailable,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(resource) => AppError::not_found(resource),
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::store(other.to_string()),
        }
    }
}

/// Read-modify-write step applied to a brute-force record while the store
/// holds that IP's record exclusively. `None` means no record existed.
pub type AttemptUpdate = dyn Fn(Option<BruteForceAttempt>) -> BruteForceAttempt + Send + Sync;

/// Everything the gate, the tracker and the admin endpoints need from storage.
///
/// Implementations must serialize `update_brute_force_attempt` per IP: two
/// concurrent calls for the same IP observe each other's result.
#[async_trait]
pub trait SecurityStore: Send + Sync + 'static {
    // Settings
    async fn get_security_settings(&self) -> StoreResult<Option<SecuritySettings>>;
    async fn save_security_settings(&self, settings: &SecuritySettings) -> StoreResult<()>;

    // IP blocks (unique by IP, saving replaces)
    async fn get_ip_blocks(&self) -> StoreResult<Vec<IpBlock>>;
    async fn get_ip_block_by_ip(&self, ip: &str) -> StoreResult<Option<IpBlock>>;
    async fn save_ip_block(&self, block: &IpBlock) -> StoreResult<()>;
    async fn delete_ip_block(&self, id: Uuid) -> StoreResult<()>;
    async fn purge_expired_ip_blocks(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn is_ip_blocked(&self, ip: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self
            .get_ip_block_by_ip(ip)
            .await?
            .map_or(false, |block| block.is_active(now)))
    }

    // GeoIP rules (unique by country code, saving replaces)
    async fn get_geoip_rules(&self) -> StoreResult<Vec<GeoIpRule>>;
    async fn get_geoip_rule_by_country(&self, country_code: &str) -> StoreResult<Option<GeoIpRule>>;
    async fn save_geoip_rule(&self, rule: &GeoIpRule) -> StoreResult<()>;
    async fn delete_geoip_rule(&self, id: Uuid) -> StoreResult<()>;

    // Brute force
    async fn get_brute_force_attempt(&self, ip: &str) -> StoreResult<Option<BruteForceAttempt>>;
    async fn save_brute_force_attempt(&self, attempt: &BruteForceAttempt) -> StoreResult<()>;
    async fn update_brute_force_attempt(
        &self,
        ip: &str,
        update: &AttemptUpdate,
    ) -> StoreResult<BruteForceAttempt>;
    /// Missing records are not an error
    async fn delete_brute_force_attempt(&self, ip: &str) -> StoreResult<()>;
    /// Drops records that are neither locked nor inside the window
    async fn cleanup_expired_brute_force_attempts(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<u64>;

    // Security events, newest first
    async fn save_security_event(&self, event: &SecurityEvent) -> StoreResult<()>;
    async fn get_security_events(&self, limit: usize) -> StoreResult<Vec<SecurityEvent>>;
    async fn get_security_events_by_type(
        &self,
        event_type: SecurityEventType,
        limit: usize,
    ) -> StoreResult<Vec<SecurityEvent>>;

    // API keys
    async fn get_api_keys(&self) -> StoreResult<Vec<ApiKey>>;
    async fn get_api_key_by_id(&self, id: Uuid) -> StoreResult<Option<ApiKey>>;
    async fn get_api_key_by_key(&self, digest: &str) -> StoreResult<Option<ApiKey>>;
    async fn save_api_key(&self, key: &ApiKey) -> StoreResult<()>;
    /// Sets `last_used_at` without touching the rest of the record
    async fn touch_api_key(&self, id: Uuid, used_at: DateTime<Utc>) -> StoreResult<()>;
    async fn delete_api_key(&self, id: Uuid) -> StoreResult<()>;

    // API access logs, newest first
    async fn save_api_access_log(&self, log: &ApiAccessLog) -> StoreResult<()>;
    async fn get_api_access_logs(&self, limit: usize) -> StoreResult<Vec<ApiAccessLog>>;
    async fn get_api_access_logs_by_key_id(
        &self,
        api_key_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ApiAccessLog>>;
}
