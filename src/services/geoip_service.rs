// ============================================================================
// GEOIP SERVICE - country resolution and allow/block rules
// ============================================================================

use ipnetwork::IpNetwork;
use std::io::BufRead;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wg_shared::{AppError, GeoIpAction, GeoIpRule, SecuritySettings};

use crate::services::clock::Clock;
use crate::store::SecurityStore;

/// IP to ISO 3166-1 alpha-2 lookup.
///
/// `Ok(None)` means the address is not covered by the database. `Err` is a
/// lookup failure; callers treat both as a passthrough.
pub trait CountryResolver: Send + Sync + 'static {
    fn resolve(&self, ip: IpAddr) -> Result<Option<String>, AppError>;
}

/// Resolver used when no GeoIP database is configured
#[derive(Debug, Default)]
pub struct UnavailableResolver;

impl CountryResolver for UnavailableResolver {
    fn resolve(&self, _ip: IpAddr) -> Result<Option<String>, AppError> {
        Err(AppError::lookup("no GeoIP database configured"))
    }
}

/// In-memory table of `cidr,country_code` ranges with longest-prefix matching
#[derive(Debug, Default)]
pub struct CidrCountryResolver {
    networks: Vec<(IpNetwork, String)>,
}

impl CidrCountryResolver {
    /// Parses one `cidr,CC` entry per line. Blank lines and `#` comments are skipped.
    pub fn from_reader(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut networks = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (cidr, country) = line
                .split_once(',')
                .ok_or_else(|| anyhow::anyhow!("line {}: expected 'cidr,country_code'", index + 1))?;
            let network: IpNetwork = cidr
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("line {}: invalid network '{}': {}", index + 1, cidr.trim(), e))?;
            let country = normalize_country_code(country)
                .map_err(|e| anyhow::anyhow!("line {}: {}", index + 1, e))?;

            networks.push((network, country));
        }
        Ok(Self { networks })
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let resolver = Self::from_reader(std::io::BufReader::new(file))?;
        info!(
            "🌍 Loaded {} GeoIP ranges from {}",
            resolver.networks.len(),
            path.as_ref().display()
        );
        Ok(resolver)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl CountryResolver for CidrCountryResolver {
    fn resolve(&self, ip: IpAddr) -> Result<Option<String>, AppError> {
        Ok(self
            .networks
            .iter()
            .filter(|(network, _)| network.contains(ip))
            .max_by_key(|(network, _)| network.prefix())
            .map(|(_, country)| country.clone()))
    }
}

/// Country lookups against a MaxMind GeoIP2/GeoLite2 database
/// (`GeoLite2-City.mmdb` or `GeoLite2-Country.mmdb`), reading `country.iso_code`.
pub struct MaxMindCountryResolver {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindCountryResolver {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to open GeoIP database {}: {}", path.as_ref().display(), e)
        })?;
        info!(
            "🌍 Loaded {} GeoIP database from {}",
            reader.metadata.database_type,
            path.as_ref().display()
        );
        Ok(Self { reader })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let reader = maxminddb::Reader::from_source(bytes)
            .map_err(|e| anyhow::anyhow!("invalid GeoIP database: {}", e))?;
        Ok(Self { reader })
    }
}

impl CountryResolver for MaxMindCountryResolver {
    fn resolve(&self, ip: IpAddr) -> Result<Option<String>, AppError> {
        match self.reader.lookup::<maxminddb::geoip2::Country>(ip) {
            Ok(record) => Ok(record
                .country
                .and_then(|country| country.iso_code)
                .and_then(|code| normalize_country_code(code).ok())),
            Err(maxminddb::MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(AppError::lookup(e.to_string())),
        }
    }
}

/// Upper-cases and checks a two-letter country code
pub fn normalize_country_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation(format!(
            "Country code must be two letters, got '{}'",
            raw.trim()
        )));
    }
    Ok(code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoDecision {
    Allow,
    Block { country: String },
}

/// Admin request for a country rule
#[derive(Debug, Clone)]
pub struct NewGeoIpRule {
    pub country_code: String,
    pub country_name: String,
    pub action: GeoIpAction,
}

#[derive(Clone)]
pub struct GeoIpService {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn CountryResolver>,
}

impl GeoIpService {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn CountryResolver>,
    ) -> Self {
        Self { store, clock, resolver }
    }

    /// Decides whether `ip` may pass. A rule for the resolved country wins,
    /// otherwise the default action applies. Anything that prevents a
    /// country from being known lets the request through.
    pub async fn evaluate(&self, ip: &str, settings: &SecuritySettings) -> GeoDecision {
        let addr = match ip.parse::<IpAddr>() {
            Ok(addr) => addr,
            Err(_) => {
                debug!(ip = %ip, "GeoIP skipped for unparsable client IP");
                return GeoDecision::Allow;
            }
        };

        let country = match self.resolver.resolve(addr) {
            Ok(Some(country)) => country,
            Ok(None) => {
                debug!(ip = %ip, "GeoIP has no country for client IP");
                return GeoDecision::Allow;
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "⚠️ GeoIP lookup failed, allowing request");
                return GeoDecision::Allow;
            }
        };

        let action = match self.store.get_geoip_rule_by_country(&country).await {
            Ok(Some(rule)) => rule.action,
            Ok(None) => settings.geoip_default_action,
            Err(e) => {
                warn!(ip = %ip, country = %country, error = %e, "⚠️ GeoIP rule lookup failed, allowing request");
                return GeoDecision::Allow;
            }
        };

        match action {
            GeoIpAction::Allow => GeoDecision::Allow,
            GeoIpAction::Block => GeoDecision::Block { country },
        }
    }

    pub async fn list(&self) -> Result<Vec<GeoIpRule>, AppError> {
        Ok(self.store.get_geoip_rules().await?)
    }

    /// Saves a rule, replacing any existing rule for the same country
    pub async fn create(&self, request: NewGeoIpRule, admin: &str) -> Result<GeoIpRule, AppError> {
        let country_code = normalize_country_code(&request.country_code)?;
        let rule = GeoIpRule {
            id: Uuid::new_v4(),
            country_name: request.country_name.trim().to_string(),
            country_code,
            action: request.action,
            created_by: admin.to_string(),
            created_at: self.clock.now(),
        };
        self.store.save_geoip_rule(&rule).await?;

        info!(
            country = %rule.country_code,
            action = %rule.action,
            admin = %admin,
            "🌍 GeoIP rule saved"
        );
        Ok(rule)
    }

    pub async fn delete(&self, id: Uuid, admin: &str) -> Result<(), AppError> {
        self.store.delete_geoip_rule(id).await?;
        info!(rule_id = %id, admin = %admin, "GeoIP rule removed");
        Ok(())
    }
}
