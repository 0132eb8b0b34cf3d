use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use wg_shared::{
    ApiAccessLog, ApiKey, BruteForceAttempt, GeoIpRule, IpBlock, SecurityEvent,
    SecurityEventType, SecuritySettings,
};

use super::{AttemptUpdate, SecurityStore, StoreError, StoreResult};

/// In-process store backed by `DashMap`s.
///
/// Per-IP brute-force updates run under the map's shard lock, so concurrent
/// failures for one IP never lose increments.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    settings: RwLock<Option<SecuritySettings>>,
    ip_blocks: DashMap<String, IpBlock>,
    geoip_rules: DashMap<String, GeoIpRule>,
    brute_force: DashMap<String, BruteForceAttempt>,
    events: RwLock<Vec<SecurityEvent>>,
    api_keys: DashMap<Uuid, ApiKey>,
    access_logs: RwLock<Vec<ApiAccessLog>>,
    outage: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `StoreError::Unavailable` until switched back.
    /// Used to exercise the pipeline's fail-open and fail-closed paths.
    pub fn set_outage(&self, down: bool) {
        self.inner.outage.store(down, Ordering::SeqCst);
    }

    fn available(&self) -> StoreResult<()> {
        if self.inner.outage.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

/// Newest first, at most `limit`
fn newest<T: Clone>(items: &[T], limit: usize, keep: impl Fn(&T) -> bool) -> Vec<T> {
    items.iter().rev().filter(|item| keep(item)).take(limit).cloned().collect()
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn get_security_settings(&self) -> StoreResult<Option<SecuritySettings>> {
        self.available()?;
        Ok(self.inner.settings.read().clone())
    }

    async fn save_security_settings(&self, settings: &SecuritySettings) -> StoreResult<()> {
        self.available()?;
        *self.inner.settings.write() = Some(settings.clone());
        Ok(())
    }

    async fn get_ip_blocks(&self) -> StoreResult<Vec<IpBlock>> {
        self.available()?;
        let mut blocks: Vec<IpBlock> = self.inner.ip_blocks.iter().map(|e| e.value().clone()).collect();
        blocks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(blocks)
    }

    async fn get_ip_block_by_ip(&self, ip: &str) -> StoreResult<Option<IpBlock>> {
        self.available()?;
        Ok(self.inner.ip_blocks.get(ip).map(|e| e.value().clone()))
    }

    async fn save_ip_block(&self, block: &IpBlock) -> StoreResult<()> {
        self.available()?;
        self.inner.ip_blocks.insert(block.ip.clone(), block.clone());
        Ok(())
    }

    async fn delete_ip_block(&self, id: Uuid) -> StoreResult<()> {
        self.available()?;
        let ip = self
            .inner
            .ip_blocks
            .iter()
            .find(|e| e.value().id == id)
            .map(|e| e.key().clone())
            .ok_or_else(|| StoreError::NotFound("IP block".to_string()))?;
        self.inner.ip_blocks.remove(&ip);
        Ok(())
    }

    async fn purge_expired_ip_blocks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.available()?;
        let before = self.inner.ip_blocks.len();
        self.inner.ip_blocks.retain(|_, block| block.is_active(now));
        Ok((before - self.inner.ip_blocks.len()) as u64)
    }

    async fn get_geoip_rules(&self) -> StoreResult<Vec<GeoIpRule>> {
        self.available()?;
        let mut rules: Vec<GeoIpRule> = self.inner.geoip_rules.iter().map(|e| e.value().clone()).collect();
        rules.sort_by(|a, b| a.country_code.cmp(&b.country_code));
        Ok(rules)
    }

    async fn get_geoip_rule_by_country(&self, country_code: &str) -> StoreResult<Option<GeoIpRule>> {
        self.available()?;
        Ok(self.inner.geoip_rules.get(country_code).map(|e| e.value().clone()))
    }

    async fn save_geoip_rule(&self, rule: &GeoIpRule) -> StoreResult<()> {
        self.available()?;
        self.inner.geoip_rules.insert(rule.country_code.clone(), rule.clone());
        Ok(())
    }

    async fn delete_geoip_rule(&self, id: Uuid) -> StoreResult<()> {
        self.available()?;
        let code = self
            .inner
            .geoip_rules
            .iter()
            .find(|e| e.value().id == id)
            .map(|e| e.key().clone())
            .ok_or_else(|| StoreError::NotFound("GeoIP rule".to_string()))?;
        self.inner.geoip_rules.remove(&code);
        Ok(())
    }

    async fn get_brute_force_attempt(&self, ip: &str) -> StoreResult<Option<BruteForceAttempt>> {
        self.available()?;
        Ok(self.inner.brute_force.get(ip).map(|e| e.value().clone()))
    }

    async fn save_brute_force_attempt(&self, attempt: &BruteForceAttempt) -> StoreResult<()> {
        self.available()?;
        self.inner.brute_force.insert(attempt.ip.clone(), attempt.clone());
        Ok(())
    }

    async fn update_brute_force_attempt(
        &self,
        ip: &str,
        update: &AttemptUpdate,
    ) -> StoreResult<BruteForceAttempt> {
        self.available()?;
        // The entry guard holds the shard write lock for the whole step.
        let next = match self.inner.brute_force.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = update(Some(occupied.get().clone()));
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                let next = update(None);
                vacant.insert(next.clone());
                next
            }
        };
        Ok(next)
    }

    async fn delete_brute_force_attempt(&self, ip: &str) -> StoreResult<()> {
        self.available()?;
        self.inner.brute_force.remove(ip);
        Ok(())
    }

    async fn cleanup_expired_brute_force_attempts(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<u64> {
        self.available()?;
        let before = self.inner.brute_force.len();
        let window_start = now - window;
        self.inner
            .brute_force
            .retain(|_, attempt| attempt.is_locked(now) || attempt.last_attempt > window_start);
        Ok((before - self.inner.brute_force.len()) as u64)
    }

    async fn save_security_event(&self, event: &SecurityEvent) -> StoreResult<()> {
        self.available()?;
        self.inner.events.write().push(event.clone());
        Ok(())
    }

    async fn get_security_events(&self, limit: usize) -> StoreResult<Vec<SecurityEvent>> {
        self.available()?;
        Ok(newest(&self.inner.events.read(), limit, |_| true))
    }

    async fn get_security_events_by_type(
        &self,
        event_type: SecurityEventType,
        limit: usize,
    ) -> StoreResult<Vec<SecurityEvent>> {
        self.available()?;
        Ok(newest(&self.inner.events.read(), limit, |e| e.event_type == event_type))
    }

    async fn get_api_keys(&self) -> StoreResult<Vec<ApiKey>> {
        self.available()?;
        let mut keys: Vec<ApiKey> = self.inner.api_keys.iter().map(|e| e.value().clone()).collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn get_api_key_by_id(&self, id: Uuid) -> StoreResult<Option<ApiKey>> {
        self.available()?;
        Ok(self.inner.api_keys.get(&id).map(|e| e.value().clone()))
    }

    async fn get_api_key_by_key(&self, digest: &str) -> StoreResult<Option<ApiKey>> {
        self.available()?;
        Ok(self
            .inner
            .api_keys
            .iter()
            .find(|e| e.value().key == digest)
            .map(|e| e.value().clone()))
    }

    async fn save_api_key(&self, key: &ApiKey) -> StoreResult<()> {
        self.available()?;
        self.inner.api_keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn touch_api_key(&self, id: Uuid, used_at: DateTime<Utc>) -> StoreResult<()> {
        self.available()?;
        let mut key = self
            .inner
            .api_keys
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("API key".to_string()))?;
        key.last_used_at = Some(used_at);
        Ok(())
    }

    async fn delete_api_key(&self, id: Uuid) -> StoreResult<()> {
        self.available()?;
        self.inner
            .api_keys
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("API key".to_string()))
    }

    async fn save_api_access_log(&self, log: &ApiAccessLog) -> StoreResult<()> {
        self.available()?;
        self.inner.access_logs.write().push(log.clone());
        Ok(())
    }

    async fn get_api_access_logs(&self, limit: usize) -> StoreResult<Vec<ApiAccessLog>> {
        self.available()?;
        Ok(newest(&self.inner.access_logs.read(), limit, |_| true))
    }

    async fn get_api_access_logs_by_key_id(
        &self,
        api_key_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ApiAccessLog>> {
        self.available()?;
        Ok(newest(&self.inner.access_logs.read(), limit, |l| l.api_key_id == api_key_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(ip: &str, permanent: bool, expires_at: Option<DateTime<Utc>>) -> IpBlock {
        IpBlock {
            id: Uuid::new_v4(),
            ip: ip.to_string(),
            reason: String::new(),
            blocked_by: "admin".to_string(),
            permanent,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ip_block_lookup_and_purge() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.save_ip_block(&block("1.1.1.1", true, None)).await.unwrap();
        store
            .save_ip_block(&block("2.2.2.2", false, Some(now - Duration::minutes(1))))
            .await
            .unwrap();

        assert!(store.is_ip_blocked("1.1.1.1", now).await.unwrap());
        assert!(!store.is_ip_blocked("2.2.2.2", now).await.unwrap());
        assert!(!store.is_ip_blocked("3.3.3.3", now).await.unwrap());

        assert_eq!(store.purge_expired_ip_blocks(now).await.unwrap(), 1);
        assert_eq!(store.get_ip_blocks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_records() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.delete_ip_block(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.delete_brute_force_attempt("9.9.9.9").await.is_ok());
    }

    #[tokio::test]
    async fn test_events_newest_first_with_type_filter() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let kind = if i % 2 == 0 {
                SecurityEventType::FailedLogin
            } else {
                SecurityEventType::BlockedIp
            };
            store
                .save_security_event(&SecurityEvent::new(kind, "1.2.3.4", format!("event {}", i)))
                .await
                .unwrap();
        }

        let latest = store.get_security_events(2).await.unwrap();
        assert_eq!(latest[0].description, "event 4");
        assert_eq!(latest[1].description, "event 3");

        let failed = store
            .get_security_events_by_type(SecurityEventType::FailedLogin, 10)
            .await
            .unwrap();
        assert_eq!(failed.len(), 3);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_locked_and_recent_records() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let window = Duration::minutes(15);

        let stale = BruteForceAttempt {
            ip: "1.1.1.1".to_string(),
            attempts: 2,
            last_attempt: now - Duration::minutes(30),
            blocked_until: None,
        };
        let locked = BruteForceAttempt {
            ip: "2.2.2.2".to_string(),
            attempts: 5,
            last_attempt: now - Duration::minutes(20),
            blocked_until: Some(now + Duration::minutes(10)),
        };
        let recent = BruteForceAttempt {
            ip: "3.3.3.3".to_string(),
            attempts: 1,
            last_attempt: now - Duration::minutes(1),
            blocked_until: None,
        };
        for attempt in [&stale, &locked, &recent] {
            store.save_brute_force_attempt(attempt).await.unwrap();
        }

        assert_eq!(store.cleanup_expired_brute_force_attempts(now, window).await.unwrap(), 1);
        assert!(store.get_brute_force_attempt("1.1.1.1").await.unwrap().is_none());
        assert!(store.get_brute_force_attempt("2.2.2.2").await.unwrap().is_some());
        assert!(store.get_brute_force_attempt("3.3.3.3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let store = MemoryStore::new();
        store.set_outage(true);
        assert!(matches!(
            store.get_security_settings().await,
            Err(StoreError::Unavailable)
        ));
        store.set_outage(false);
        assert!(store.get_security_settings().await.unwrap().is_none());
    }
}
