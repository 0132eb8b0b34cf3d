// ============================================================================
// BRUTE FORCE SERVICE - sliding-window lockout for login failures
// ============================================================================

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use wg_shared::{AppError, BruteForceAttempt, SecurityEvent, SecurityEventType, SecuritySettings};

use crate::observability::metrics::BRUTE_FORCE_LOCKOUTS_TOTAL;
use crate::services::clock::Clock;
use crate::services::security_event_service::SecurityEventService;
use crate::services::settings_service::SettingsProvider;
use crate::store::SecurityStore;

/// Next state of an IP's counter after one more failed login at `now`.
///
/// The window slides with `now`: a record whose last failure is at or before
/// `now - window` starts over, so the new failure counts as the first. Reaching
/// the threshold sets `blocked_until` from the current `now`; a lockout is
/// recomputed, never extended on its own.
pub fn apply_failure(
    existing: Option<BruteForceAttempt>,
    ip: &str,
    now: DateTime<Utc>,
    settings: &SecuritySettings,
) -> BruteForceAttempt {
    let mut attempt = existing.unwrap_or_else(|| BruteForceAttempt::new(ip, now));

    if attempt.last_attempt <= now - settings.window() {
        attempt.attempts = 0;
    }

    attempt.attempts = attempt.attempts.saturating_add(1);
    attempt.last_attempt = now;

    if attempt.attempts >= settings.brute_force_max_attempts {
        attempt.blocked_until = Some(now + settings.block_duration());
    }

    attempt
}

#[derive(Clone)]
pub struct BruteForceTracker {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    settings: SettingsProvider,
    events: SecurityEventService,
}

impl BruteForceTracker {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        clock: Arc<dyn Clock>,
        settings: SettingsProvider,
        events: SecurityEventService,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            events,
        }
    }

    /// Counts one failed login from `ip`. Returns the stored record, or `None`
    /// when tracking is off or nothing could be persisted.
    pub async fn record_failure(&self, ip: &str, username: Option<&str>) -> Option<BruteForceAttempt> {
        let settings = match self.settings.get().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(ip = %ip, error = %e, "⚠️ Settings unavailable, failed login not tracked");
                return None;
            }
        };
        if !settings.brute_force_enabled {
            return None;
        }

        let now = self.clock.now();
        let max_attempts = settings.brute_force_max_attempts;
        let owned_ip = ip.to_string();
        let was_locked = Arc::new(AtomicBool::new(false));
        let seen_locked = was_locked.clone();
        let update = move |existing: Option<BruteForceAttempt>| {
            let locked = existing.as_ref().map_or(false, |a| a.is_locked(now));
            seen_locked.store(locked, Ordering::SeqCst);
            apply_failure(existing, &owned_ip, now, &settings)
        };

        match self.store.update_brute_force_attempt(ip, &update).await {
            Ok(attempt) => {
                // Only the failure that moves the IP into the locked state counts
                if attempt.is_locked(now) && !was_locked.load(Ordering::SeqCst) {
                    let until = attempt.blocked_until.unwrap_or(now);
                    warn!(
                        ip = %ip,
                        attempts = attempt.attempts,
                        blocked_until = %until,
                        "🔒 IP locked out after repeated failed logins"
                    );
                    BRUTE_FORCE_LOCKOUTS_TOTAL.inc();
                    self.events
                        .record(with_username(
                            SecurityEvent::new(
                                SecurityEventType::BruteForce,
                                ip,
                                format!(
                                    "IP locked after {} failed login attempts until {}",
                                    attempt.attempts,
                                    until.to_rfc3339()
                                ),
                            ),
                            username,
                        ))
                        .await;
                }

                self.events
                    .record(with_username(
                        SecurityEvent::new(
                            SecurityEventType::FailedLogin,
                            ip,
                            format!(
                                "Failed login attempt for user '{}' (attempt {} of {})",
                                username.unwrap_or(""),
                                attempt.attempts,
                                max_attempts
                            ),
                        ),
                        username,
                    ))
                    .await;

                Some(attempt)
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "⚠️ Failed to persist brute force attempt");
                self.events
                    .record(with_username(
                        SecurityEvent::new(
                            SecurityEventType::FailedLogin,
                            ip,
                            format!("Failed login attempt for user '{}'", username.unwrap_or("")),
                        ),
                        username,
                    ))
                    .await;
                None
            }
        }
    }

    /// Lockout deadline for `ip` if it is currently locked
    pub async fn locked_until(&self, ip: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        let now = self.clock.now();
        Ok(self
            .store
            .get_brute_force_attempt(ip)
            .await?
            .filter(|attempt| attempt.is_locked(now))
            .and_then(|attempt| attempt.blocked_until))
    }

    pub async fn is_locked(&self, ip: &str) -> Result<bool, AppError> {
        Ok(self.locked_until(ip).await?.is_some())
    }

    /// Forgets every failure from `ip` after a successful login
    pub async fn clear_on_success(&self, ip: &str) {
        match self.store.delete_brute_force_attempt(ip).await {
            Ok(()) => debug!(ip = %ip, "Brute force counter cleared"),
            Err(e) => warn!(ip = %ip, error = %e, "⚠️ Failed to clear brute force counter"),
        }
    }

    /// Housekeeping: drops records that are neither locked nor inside the window
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        let settings = self.settings.get().await?;
        Ok(self
            .store
            .cleanup_expired_brute_force_attempts(self.clock.now(), settings.window())
            .await?)
    }
}

fn with_username(event: SecurityEvent, username: Option<&str>) -> SecurityEvent {
    match username {
        Some(username) if !username.is_empty() => event.username(username),
        _ => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        tracker: BruteForceTracker,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::default());
        let dyn_store: Arc<dyn SecurityStore> = Arc::new(store.clone());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let settings = SettingsProvider::new(dyn_store.clone(), dyn_clock.clone(), std::time::Duration::ZERO);
        let events = SecurityEventService::new(dyn_store.clone(), dyn_clock.clone());
        let tracker = BruteForceTracker::new(dyn_store, dyn_clock, settings, events);
        Fixture { store, clock, tracker }
    }

    #[test]
    fn test_apply_failure_boundary_resets_to_one() {
        let settings = SecuritySettings::default();
        let now = Utc::now();
        let existing = BruteForceAttempt {
            ip: "1.1.1.1".to_string(),
            attempts: 4,
            last_attempt: now - settings.window(),
            blocked_until: None,
        };

        let next = apply_failure(Some(existing), "1.1.1.1", now, &settings);
        assert_eq!(next.attempts, 1);
        assert_eq!(next.last_attempt, now);
        assert!(next.blocked_until.is_none());
    }

    #[test]
    fn test_apply_failure_recomputes_lockout_from_now() {
        let settings = SecuritySettings::default();
        let now = Utc::now();
        let existing = BruteForceAttempt {
            ip: "1.1.1.1".to_string(),
            attempts: 5,
            last_attempt: now - Duration::minutes(1),
            blocked_until: Some(now + Duration::minutes(29)),
        };

        let next = apply_failure(Some(existing), "1.1.1.1", now, &settings);
        assert_eq!(next.attempts, 6);
        assert_eq!(next.blocked_until, Some(now + Duration::minutes(30)));
    }

    #[tokio::test]
    async fn test_five_failures_within_window_lock() {
        let f = fixture();
        for _ in 0..4 {
            f.tracker.record_failure("1.2.3.4", Some("admin")).await;
            f.clock.advance(Duration::minutes(1));
        }
        assert!(!f.tracker.is_locked("1.2.3.4").await.unwrap());

        f.tracker.record_failure("1.2.3.4", Some("admin")).await;
        assert!(f.tracker.is_locked("1.2.3.4").await.unwrap());

        f.clock.advance(Duration::minutes(30));
        assert!(!f.tracker.is_locked("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn test_spread_failures_never_lock() {
        let f = fixture();
        for _ in 0..10 {
            let attempt = f.tracker.record_failure("1.2.3.4", None).await.unwrap();
            assert_eq!(attempt.attempts, 1);
            f.clock.advance(Duration::minutes(16));
        }
        assert!(!f.tracker.is_locked("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn test_success_restarts_counter() {
        let f = fixture();
        for _ in 0..5 {
            f.tracker.record_failure("1.2.3.4", None).await;
        }
        assert!(f.tracker.is_locked("1.2.3.4").await.unwrap());

        f.tracker.clear_on_success("1.2.3.4").await;
        for _ in 0..4 {
            f.tracker.record_failure("1.2.3.4", None).await;
        }
        assert!(!f.tracker.is_locked("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn test_events_emitted_per_failure_and_lock() {
        let f = fixture();
        for _ in 0..5 {
            f.tracker.record_failure("1.2.3.4", Some("alice")).await;
        }

        let failed = f
            .store
            .get_security_events_by_type(SecurityEventType::FailedLogin, 100)
            .await
            .unwrap();
        let locks = f
            .store
            .get_security_events_by_type(SecurityEventType::BruteForce, 100)
            .await
            .unwrap();
        assert_eq!(failed.len(), 5);
        assert_eq!(locks.len(), 1);
        assert!(failed[0].description.contains("attempt 5 of 5"));
        assert_eq!(failed[0].username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_lock_counted_once_per_transition() {
        let f = fixture();
        let provider = f.tracker.settings.clone();
        let mut settings = provider.get().await.unwrap();
        settings.brute_force_max_attempts = 3;
        settings.brute_force_block_minutes = 5;
        provider.update(settings).await.unwrap();

        let locks = |store: MemoryStore| async move {
            store
                .get_security_events_by_type(SecurityEventType::BruteForce, 100)
                .await
                .unwrap()
                .len()
        };

        for _ in 0..3 {
            f.tracker.record_failure("4.4.4.4", None).await;
        }
        assert_eq!(locks(f.store.clone()).await, 1);

        // Failures that slip in while already locked do not re-announce the lock
        f.tracker.record_failure("4.4.4.4", None).await;
        f.tracker.record_failure("4.4.4.4", None).await;
        assert_eq!(locks(f.store.clone()).await, 1);

        // The lock lapses inside the window; the next failure locks again
        f.clock.advance(Duration::minutes(6));
        assert!(!f.tracker.is_locked("4.4.4.4").await.unwrap());
        let attempt = f.tracker.record_failure("4.4.4.4", None).await.unwrap();
        assert_eq!(attempt.attempts, 6);
        assert!(f.tracker.is_locked("4.4.4.4").await.unwrap());
        assert_eq!(locks(f.store.clone()).await, 2);
    }

    #[tokio::test]
    async fn test_disabled_tracking_is_noop() {
        let f = fixture();
        let provider = f.tracker.settings.clone();
        let mut settings = provider.get().await.unwrap();
        settings.brute_force_enabled = false;
        provider.update(settings).await.unwrap();

        assert!(f.tracker.record_failure("1.2.3.4", None).await.is_none());
        assert!(f.store.get_brute_force_attempt("1.2.3.4").await.unwrap().is_none());
        assert!(f.store.get_security_events(10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_not_lost() {
        let f = fixture();
        let provider = f.tracker.settings.clone();
        let mut settings = provider.get().await.unwrap();
        settings.brute_force_max_attempts = 20;
        provider.update(settings).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let tracker = f.tracker.clone();
                tokio::spawn(async move { tracker.record_failure("7.7.7.7", None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let attempt = f.store.get_brute_force_attempt("7.7.7.7").await.unwrap().unwrap();
        assert_eq!(attempt.attempts, 20);
        let locks = f
            .store
            .get_security_events_by_type(SecurityEventType::BruteForce, 100)
            .await
            .unwrap();
        assert_eq!(locks.len(), 1);
    }
}
