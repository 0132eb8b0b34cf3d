// ============================================================================
// IP BLOCK SERVICE - static blocklist lookups and admin management
// ============================================================================

use chrono::Duration;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use wg_shared::{AppError, IpBlock, SecurityEvent, SecurityEventType};

use crate::services::clock::Clock;
use crate::services::security_event_service::SecurityEventService;
use crate::store::SecurityStore;

/// Longest temporary block, ten years
pub const MAX_BLOCK_HOURS: i64 = 87_600;

/// Admin request for a new block
#[derive(Debug, Clone)]
pub struct NewIpBlock {
    pub ip: String,
    pub reason: String,
    pub permanent: bool,
    /// Lifetime of a non-permanent block, 1 to `MAX_BLOCK_HOURS`
    pub hours: i64,
}

#[derive(Clone)]
pub struct IpBlockService {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    events: SecurityEventService,
}

impl IpBlockService {
    pub fn new(store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>, events: SecurityEventService) -> Self {
        Self { store, clock, events }
    }

    /// True while a permanent block or an unexpired temporary block exists for `ip`
    pub async fn is_blocked(&self, ip: &str) -> Result<bool, AppError> {
        Ok(self.store.is_ip_blocked(ip, self.clock.now()).await?)
    }

    pub async fn list(&self) -> Result<Vec<IpBlock>, AppError> {
        Ok(self.store.get_ip_blocks().await?)
    }

    pub async fn create(&self, request: NewIpBlock, admin: &str) -> Result<IpBlock, AppError> {
        let ip = normalize_ip(&request.ip)?;
        if !request.permanent && !(1..=MAX_BLOCK_HOURS).contains(&request.hours) {
            return Err(AppError::validation(format!(
                "Temporary blocks need a duration between 1 and {} hours",
                MAX_BLOCK_HOURS
            )));
        }

        let now = self.clock.now();
        let expires_at = if request.permanent {
            None
        } else {
            let expires_at = Duration::try_hours(request.hours)
                .and_then(|hours| now.checked_add_signed(hours))
                .ok_or_else(|| AppError::validation("Block duration is out of range"))?;
            Some(expires_at)
        };
        let block = IpBlock {
            id: Uuid::new_v4(),
            ip: ip.clone(),
            reason: request.reason.trim().to_string(),
            blocked_by: admin.to_string(),
            permanent: request.permanent,
            expires_at,
            created_at: now,
        };
        self.store.save_ip_block(&block).await?;

        self.events
            .record(
                SecurityEvent::new(
                    SecurityEventType::BlockedIp,
                    &ip,
                    format!("IP {} blocked by admin {}. Reason: {}", ip, admin, block.reason),
                )
                .username(admin),
            )
            .await;

        info!(ip = %ip, admin = %admin, permanent = block.permanent, "🚫 IP blocked by admin");
        Ok(block)
    }

    pub async fn delete(&self, id: Uuid, admin: &str) -> Result<(), AppError> {
        self.store.delete_ip_block(id).await?;
        info!(block_id = %id, admin = %admin, "IP block removed");
        Ok(())
    }

    /// Drops expired temporary blocks. Lookups already ignore them.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        Ok(self.store.purge_expired_ip_blocks(self.clock.now()).await?)
    }
}

/// Trims and canonicalizes an address so lookups match the resolved client IP
pub fn normalize_ip(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::validation("IP address is required"));
    }
    raw.parse::<IpAddr>()
        .map(|ip| ip.to_canonical().to_string())
        .map_err(|_| AppError::validation(format!("Invalid IP address '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::store::MemoryStore;

    fn service(store: &MemoryStore, clock: &Arc<ManualClock>) -> IpBlockService {
        let store: Arc<dyn SecurityStore> = Arc::new(store.clone());
        let clock: Arc<dyn Clock> = clock.clone();
        let events = SecurityEventService::new(store.clone(), clock.clone());
        IpBlockService::new(store, clock, events)
    }

    fn request(ip: &str, permanent: bool, hours: i64) -> NewIpBlock {
        NewIpBlock {
            ip: ip.to_string(),
            reason: "scanner".to_string(),
            permanent,
            hours,
        }
    }

    #[tokio::test]
    async fn test_temporary_block_expires() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::default());
        let service = service(&store, &clock);

        service.create(request("10.0.0.7", false, 2), "admin").await.unwrap();
        assert!(service.is_blocked("10.0.0.7").await.unwrap());

        clock.advance(Duration::hours(2) - Duration::seconds(1));
        assert!(service.is_blocked("10.0.0.7").await.unwrap());

        clock.advance(Duration::seconds(1));
        assert!(!service.is_blocked("10.0.0.7").await.unwrap());

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_block_emits_event() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::default());
        let service = service(&store, &clock);

        let block = service.create(request(" 9.9.9.9 ", true, 0), "root").await.unwrap();
        assert_eq!(block.ip, "9.9.9.9");
        assert!(block.expires_at.is_none());

        clock.advance(Duration::days(365));
        assert!(service.is_blocked("9.9.9.9").await.unwrap());

        let events = store.get_security_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::BlockedIp);
        assert_eq!(events[0].username.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::default());
        let service = service(&store, &clock);

        for bad in [
            request("", true, 0),
            request("not-an-ip", true, 0),
            request("1.2.3.4", false, 0),
            request("1.2.3.4", false, MAX_BLOCK_HOURS + 1),
            request("1.2.3.4", false, i64::MAX),
        ] {
            let err = service.create(bad, "admin").await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
        }
        assert!(store.get_security_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_longest_temporary_block() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::default());
        let service = service(&store, &clock);
        let now = clock.now();

        let block = service
            .create(request("1.2.3.4", false, MAX_BLOCK_HOURS), "admin")
            .await
            .unwrap();
        assert_eq!(block.expires_at, Some(now + Duration::hours(MAX_BLOCK_HOURS)));
    }

    #[test]
    fn test_normalize_ip_canonicalizes_v6() {
        assert_eq!(normalize_ip("2001:DB8:0:0::1").unwrap(), "2001:db8::1");
    }
}
