use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use wg_shared::Config;

use crate::services::{
    ApiKeyService, BcryptCredentialVerifier, BruteForceTracker, CidrCountryResolver, Clock,
    CountryResolver, CredentialVerifier, GeoIpService, IpBlockService, MaxMindCountryResolver,
    SecurityEventService, SessionService, SettingsProvider, SystemClock, UnavailableResolver,
};
use crate::store::{MemoryStore, PgStore, SecurityStore};

/// Shared application state.
/// Every collaborator is injected so tests can swap the store, the clock,
/// the country resolver and the credential check.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: SettingsProvider,
    pub events: SecurityEventService,
    pub ip_blocks: IpBlockService,
    pub brute_force: BruteForceTracker,
    pub geoip: GeoIpService,
    pub api_keys: ApiKeyService,
    pub sessions: SessionService,
    pub credentials: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn SecurityStore> = match &config.database.url {
            Some(url) => {
                let store = PgStore::connect(url, &config.database)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
                store
                    .migrate()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to prepare security schema: {}", e))?;
                Arc::new(store)
            }
            None => {
                warn!("⚠️ DATABASE_URL not set, security state is kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let resolver: Arc<dyn CountryResolver> =
            match (&config.security.geoip_db_path, &config.security.geoip_cidr_file) {
                (Some(path), _) => Arc::new(MaxMindCountryResolver::open(path)?),
                (None, Some(path)) => Arc::new(CidrCountryResolver::from_file(path)?),
                (None, None) => {
                    info!("No GeoIP database configured, GeoIP rules will not match any request");
                    Arc::new(UnavailableResolver)
                }
            };

        let credentials = Arc::new(BcryptCredentialVerifier::from_config(&config.auth));

        Ok(Self::from_parts(config, store, Arc::new(SystemClock), resolver, credentials))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn SecurityStore>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn CountryResolver>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let settings = SettingsProvider::new(
            store.clone(),
            clock.clone(),
            Duration::from_secs(config.security.settings_cache_ttl_seconds),
        );
        let events = SecurityEventService::new(store.clone(), clock.clone());
        let ip_blocks = IpBlockService::new(store.clone(), clock.clone(), events.clone());
        let brute_force =
            BruteForceTracker::new(store.clone(), clock.clone(), settings.clone(), events.clone());
        let geoip = GeoIpService::new(store.clone(), clock.clone(), resolver);
        let api_keys = ApiKeyService::new(store, clock);
        let sessions = SessionService::new(&config.auth);

        Self {
            config: Arc::new(config),
            settings,
            events,
            ip_blocks,
            brute_force,
            geoip,
            api_keys,
            sessions,
            credentials,
        }
    }
}
