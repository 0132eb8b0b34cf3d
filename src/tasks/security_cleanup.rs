// ============================================================================
// SECURITY HOUSEKEEPING - periodic sweep of stale counters and expired blocks
// ============================================================================
// Lookups already ignore expired records; this only keeps storage small.
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub brute_force_records: u64,
    pub ip_blocks: u64,
}

/// One sweep. Each half runs even if the other fails.
pub async fn run_security_cleanup(state: &AppState) -> CleanupReport {
    let mut report = CleanupReport::default();

    match state.brute_force.cleanup_expired().await {
        Ok(removed) => report.brute_force_records = removed,
        Err(e) => warn!("⚠️ Brute force cleanup failed: {}", e),
    }

    match state.ip_blocks.purge_expired().await {
        Ok(removed) => report.ip_blocks = removed,
        Err(e) => warn!("⚠️ Expired IP block purge failed: {}", e),
    }

    if report.brute_force_records > 0 || report.ip_blocks > 0 {
        info!(
            brute_force_records = report.brute_force_records,
            ip_blocks = report.ip_blocks,
            "🧹 Security housekeeping removed stale records"
        );
    } else {
        debug!("🧹 Security housekeeping found nothing to remove");
    }

    report
}

pub fn start_security_cleanup_task(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    info!("🔄 Security housekeeping every {:?}", every);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_security_cleanup(&state).await;
        }
    })
}
