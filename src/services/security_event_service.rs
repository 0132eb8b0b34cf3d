// ============================================================================
// SECURITY EVENT SERVICE - audit trail of gate decisions
// ============================================================================

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use wg_shared::{AppError, SecurityEvent, SecurityEventType};

use crate::services::clock::Clock;
use crate::store::SecurityStore;

/// Number of recent events the statistics endpoint aggregates over
pub const STATISTICS_WINDOW: usize = 1000;

#[derive(Clone)]
pub struct SecurityEventService {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SecurityStatistics {
    pub total_events: usize,
    pub failed_logins: usize,
    pub blocked_ips: usize,
    pub blocked_geoips: usize,
    pub brute_force_blocks: usize,
    pub top_ips: BTreeMap<String, usize>,
    pub events_by_type: BTreeMap<String, usize>,
}

impl SecurityEventService {
    pub fn new(store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persists an event stamped with the current time.
    ///
    /// Failures are logged and swallowed: the request being audited goes on.
    pub async fn record(&self, event: SecurityEvent) {
        let event = event.at(self.clock.now());
        if let Err(e) = self.store.save_security_event(&event).await {
            warn!(
                event_type = %event.event_type,
                ip = %event.ip,
                error = %e,
                "⚠️ Failed to persist security event"
            );
        }
    }

    pub async fn recent(
        &self,
        limit: usize,
        event_type: Option<SecurityEventType>,
    ) -> Result<Vec<SecurityEvent>, AppError> {
        let events = match event_type {
            Some(event_type) => self.store.get_security_events_by_type(event_type, limit).await?,
            None => self.store.get_security_events(limit).await?,
        };
        Ok(events)
    }

    pub async fn statistics(&self) -> Result<SecurityStatistics, AppError> {
        let events = self.store.get_security_events(STATISTICS_WINDOW).await?;
        Ok(aggregate(&events))
    }
}

fn aggregate(events: &[SecurityEvent]) -> SecurityStatistics {
    let mut stats = SecurityStatistics {
        total_events: events.len(),
        ..Default::default()
    };

    for event in events {
        *stats.top_ips.entry(event.ip.clone()).or_default() += 1;
        *stats
            .events_by_type
            .entry(event.event_type.as_str().to_string())
            .or_default() += 1;

        match event.event_type {
            SecurityEventType::FailedLogin => stats.failed_logins += 1,
            SecurityEventType::BlockedIp => stats.blocked_ips += 1,
            SecurityEventType::BlockedGeoip => stats.blocked_geoips += 1,
            SecurityEventType::BruteForce => stats.brute_force_blocks += 1,
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_record_swallows_store_failure() {
        let store = MemoryStore::new();
        let service = SecurityEventService::new(Arc::new(store.clone()), Arc::new(ManualClock::default()));

        store.set_outage(true);
        service
            .record(SecurityEvent::new(SecurityEventType::BlockedIp, "1.2.3.4", "blocked"))
            .await;

        store.set_outage(false);
        assert!(store.get_security_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_counts_per_type_and_ip() {
        let store = MemoryStore::new();
        let service = SecurityEventService::new(Arc::new(store.clone()), Arc::new(ManualClock::default()));

        for _ in 0..3 {
            service
                .record(SecurityEvent::new(SecurityEventType::FailedLogin, "1.2.3.4", "bad password"))
                .await;
        }
        service
            .record(SecurityEvent::new(SecurityEventType::BlockedGeoip, "5.6.7.8", "CN").country("CN"))
            .await;

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.failed_logins, 3);
        assert_eq!(stats.blocked_geoips, 1);
        assert_eq!(stats.top_ips["1.2.3.4"], 3);
        assert_eq!(stats.events_by_type["blocked_geoip"], 1);
    }
}
