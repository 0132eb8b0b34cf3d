// ============================================================================
// SETTINGS SERVICE - read-through cache over the stored SecuritySettings
// ============================================================================

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use wg_shared::{AppError, SecuritySettings};

use crate::services::clock::Clock;
use crate::store::SecurityStore;

/// Hands out the current settings to the gate and the tracker.
///
/// Reads are cached for `ttl`. Admin writes go through [`SettingsProvider::update`],
/// which refreshes the cache immediately so a saved change applies to the
/// very next request.
#[derive(Clone)]
pub struct SettingsProvider {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: Arc<RwLock<Option<(SecuritySettings, Instant)>>>,
}

impl SettingsProvider {
    pub fn new(store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Current settings. Fails with `ConfigUnavailable` when the store cannot answer.
    pub async fn get(&self) -> Result<SecuritySettings, AppError> {
        let cached = self
            .cache
            .read()
            .as_ref()
            .filter(|(_, loaded_at)| loaded_at.elapsed() < self.ttl)
            .map(|(settings, _)| settings.clone());
        if let Some(settings) = cached {
            return Ok(settings);
        }

        let settings = match self
            .store
            .get_security_settings()
            .await
            .map_err(|e| AppError::config_unavailable(e.to_string()))?
        {
            Some(settings) => settings,
            None => self.save_defaults().await?,
        };

        *self.cache.write() = Some((settings.clone(), Instant::now()));
        Ok(settings)
    }

    /// Validates and persists new settings, stamping `updated_at`
    pub async fn update(&self, mut settings: SecuritySettings) -> Result<SecuritySettings, AppError> {
        settings.validate()?;
        settings.updated_at = self.clock.now();
        self.store.save_security_settings(&settings).await?;

        *self.cache.write() = Some((settings.clone(), Instant::now()));
        info!(
            brute_force = settings.brute_force_enabled,
            ip_blocking = settings.ip_blocking_enabled,
            geoip = settings.geoip_enabled,
            "🔐 Security settings updated"
        );
        Ok(settings)
    }

    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Writes the defaults on first boot. Existing settings are left alone.
    pub async fn ensure_initialized(&self) -> Result<SecuritySettings, AppError> {
        self.invalidate();
        self.get().await
    }

    async fn save_defaults(&self) -> Result<SecuritySettings, AppError> {
        let defaults = SecuritySettings {
            updated_at: self.clock.now(),
            ..SecuritySettings::default()
        };
        self.store
            .save_security_settings(&defaults)
            .await
            .map_err(|e| AppError::config_unavailable(e.to_string()))?;
        info!("🔐 Security settings initialized with defaults");
        Ok(defaults)
    }
}
