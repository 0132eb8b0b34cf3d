// ============================================================================
// ACCESS-GATING SERVICES
// ============================================================================

pub mod api_key_service;
pub mod brute_force_service;
pub mod clock;
pub mod credential_service;
pub mod geoip_service;
pub mod ip_block_service;
pub mod security_event_service;
pub mod session_service;
pub mod settings_service;

pub use api_key_service::{ApiKeyChanges, ApiKeyService, IssuedApiKey, NewApiKey};
pub use brute_force_service::BruteForceTracker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential_service::{BcryptCredentialVerifier, CredentialVerifier};
pub use geoip_service::{
    CidrCountryResolver, CountryResolver, GeoDecision, GeoIpService, MaxMindCountryResolver, NewGeoIpRule,
    UnavailableResolver,
};
pub use ip_block_service::{IpBlockService, NewIpBlock};
pub use security_event_service::SecurityEventService;
pub use session_service::SessionService;
pub use settings_service::SettingsProvider;
