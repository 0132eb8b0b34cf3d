//! Access-gating entities shared by the console and its stores

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

// ============================================================================
// SECURITY SETTINGS
// ============================================================================

/// Outcome of a country rule (or of the GeoIP default when no rule matches)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GeoIpAction {
    Allow,
    Block,
}

impl GeoIpAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoIpAction::Allow => "allow",
            GeoIpAction::Block => "block",
        }
    }
}

impl std::fmt::Display for GeoIpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeoIpAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(GeoIpAction::Allow),
            "block" => Ok(GeoIpAction::Block),
            other => Err(AppError::validation(format!(
                "Action must be 'block' or 'allow', got '{}'",
                other
            ))),
        }
    }
}

/// Global security configuration, edited by administrators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecuritySettings {
    // Brute force protection
    pub brute_force_enabled: bool,
    pub brute_force_max_attempts: u32,
    pub brute_force_window_minutes: u32,
    pub brute_force_block_minutes: u32,

    // IP blocking
    pub ip_blocking_enabled: bool,

    // GeoIP blocking
    pub geoip_enabled: bool,
    pub geoip_default_action: GeoIpAction,

    pub updated_at: DateTime<Utc>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            brute_force_enabled: true,
            brute_force_max_attempts: 5,
            brute_force_window_minutes: 15,
            brute_force_block_minutes: 30,
            ip_blocking_enabled: true,
            geoip_enabled: false,
            geoip_default_action: GeoIpAction::Allow,
            updated_at: Utc::now(),
        }
    }
}

impl SecuritySettings {
    pub fn window(&self) -> Duration {
        Duration::minutes(i64::from(self.brute_force_window_minutes))
    }

    pub fn block_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.brute_force_block_minutes))
    }

    /// Rejects tuning values that would make the brute-force tracker meaningless
    pub fn validate(&self) -> Result<(), AppError> {
        if self.brute_force_max_attempts == 0 {
            return Err(AppError::validation("brute_force_max_attempts must be at least 1"));
        }
        if self.brute_force_window_minutes == 0 {
            return Err(AppError::validation("brute_force_window_minutes must be at least 1"));
        }
        if self.brute_force_block_minutes == 0 {
            return Err(AppError::validation("brute_force_block_minutes must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// IP BLOCKS & GEOIP RULES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpBlock {
    pub id: Uuid,
    pub ip: String,
    pub reason: String,
    /// Username of the admin who created the block
    pub blocked_by: String,
    pub permanent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IpBlock {
    /// Expired non-permanent blocks stay in storage until purged but no longer apply.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.permanent || self.expires_at.map_or(false, |expires_at| now < expires_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeoIpRule {
    pub id: Uuid,
    /// ISO 3166-1 alpha-2, upper case
    pub country_code: String,
    pub country_name: String,
    pub action: GeoIpAction,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// BRUTE FORCE
// ============================================================================

/// Failed-login counter for a single client IP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BruteForceAttempt {
    pub ip: String,
    pub attempts: u32,
    pub last_attempt: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl BruteForceAttempt {
    pub fn new(ip: &str, now: DateTime<Utc>) -> Self {
        Self {
            ip: ip.to_string(),
            attempts: 0,
            last_attempt: now,
            blocked_until: None,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map_or(false, |until| now < until)
    }
}

// ============================================================================
// SECURITY EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    FailedLogin,
    BlockedIp,
    BlockedGeoip,
    BruteForce,
}

impl SecurityEventType {
    pub const ALL: [SecurityEventType; 4] = [
        SecurityEventType::FailedLogin,
        SecurityEventType::BlockedIp,
        SecurityEventType::BlockedGeoip,
        SecurityEventType::BruteForce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::FailedLogin => "failed_login",
            SecurityEventType::BlockedIp => "blocked_ip",
            SecurityEventType::BlockedGeoip => "blocked_geoip",
            SecurityEventType::BruteForce => "brute_force",
        }
    }
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown event type '{}'", s)))
    }
}

/// Append-only audit record for a security decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: SecurityEventType,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, ip: &str, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            ip: ip.to_string(),
            country: None,
            username: None,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    pub fn country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

// ============================================================================
// API KEYS
// ============================================================================

/// Capabilities an API key can be granted. Matching is exact, no wildcards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Permission {
    #[serde(rename = "read:clients")]
    ReadClients,
    #[serde(rename = "write:clients")]
    WriteClients,
    #[serde(rename = "read:server")]
    ReadServer,
    #[serde(rename = "write:server")]
    WriteServer,
    #[serde(rename = "manage:groups")]
    ManageGroups,
    #[serde(rename = "read:stats")]
    ReadStats,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ReadClients,
        Permission::WriteClients,
        Permission::ReadServer,
        Permission::WriteServer,
        Permission::ManageGroups,
        Permission::ReadStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadClients => "read:clients",
            Permission::WriteClients => "write:clients",
            Permission::ReadServer => "read:server",
            Permission::WriteServer => "write:server",
            Permission::ManageGroups => "manage:groups",
            Permission::ReadStats => "read:stats",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown permission '{}'", s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    /// SHA-256 digest of the raw key. Never serialized.
    #[serde(skip_serializing, default)]
    pub key: String,
    /// First 8 hex characters of the raw key, for display only
    pub key_prefix: String,
    pub permissions: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.iter().any(|p| p == permission.as_str())
    }
}

/// One row per authenticated API call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiAccessLog {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub api_key_name: String,
    pub endpoint: String,
    pub method: String,
    pub ip_address: String,
    pub user_agent: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_block_activity() {
        let now = Utc::now();
        let mut block = IpBlock {
            id: Uuid::new_v4(),
            ip: "10.0.0.1".to_string(),
            reason: "scanner".to_string(),
            blocked_by: "admin".to_string(),
            permanent: false,
            expires_at: Some(now + Duration::hours(1)),
            created_at: now,
        };

        assert!(block.is_active(now));
        assert!(block.is_active(now + Duration::minutes(59)));
        assert!(!block.is_active(now + Duration::hours(1)));

        block.expires_at = None;
        assert!(!block.is_active(now));

        block.permanent = true;
        assert!(block.is_active(now + Duration::days(3650)));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&SecurityEventType::BlockedGeoip).unwrap(),
            "\"blocked_geoip\""
        );
        assert_eq!(
            serde_json::to_string(&Permission::ManageGroups).unwrap(),
            "\"manage:groups\""
        );
        assert_eq!("block".parse::<GeoIpAction>().unwrap(), GeoIpAction::Block);
        assert!("deny".parse::<GeoIpAction>().is_err());
        assert!("read:*".parse::<Permission>().is_err());
    }

    #[test]
    fn test_api_key_digest_never_serialized() {
        let now = Utc::now();
        let key = ApiKey {
            id: Uuid::new_v4(),
            name: "ci".to_string(),
            key: "deadbeef".repeat(8),
            key_prefix: "0123abcd".to_string(),
            permissions: vec!["read:clients".to_string()],
            enabled: true,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        };

        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("key").is_none());
        assert_eq!(json["key_prefix"], "0123abcd");
        assert!(key.has_permission(Permission::ReadClients));
        assert!(!key.has_permission(Permission::WriteClients));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = SecuritySettings::default();
        assert!(settings.validate().is_ok());
        settings.brute_force_max_attempts = 0;
        assert!(settings.validate().is_err());
    }
}
