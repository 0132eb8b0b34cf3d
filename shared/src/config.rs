//! Configuration management for the console

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Prefix for every route, e.g. `/wg`. Empty for root.
    pub base_path: String,
    /// Honor X-Forwarded-For / X-Real-IP when resolving the client IP
    pub trust_proxy: bool,
    /// Browser origins granted CORS access
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// When unset the console runs on the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// MaxMind `.mmdb` database. Takes precedence over the CIDR table.
    pub geoip_db_path: Option<String>,
    pub geoip_cidr_file: Option<String>,
    pub settings_cache_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub admin_username: String,
    /// bcrypt hash. Without it every console login fails.
    pub admin_password_hash: Option<String>,
    /// Generated per process when unset
    pub jwt_secret: Option<String>,
    pub session_ttl_hours: i64,
}

fn var_or<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}", name))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalizes a base path to either `""` or `/segment[/segment]` without trailing slash
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                port: var_or("PORT", "5000")?,
                base_path: normalize_base_path(&env::var("BASE_PATH").unwrap_or_default()),
                trust_proxy: var_or("TRUST_PROXY", "false")?,
                cors_allowed_origins: list_var("CORS_ALLOWED_ORIGINS"),
            },
            database: DatabaseConfig {
                url: optional_var("DATABASE_URL"),
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", "10")?,
                acquire_timeout_seconds: var_or("DATABASE_ACQUIRE_TIMEOUT_SECONDS", "5")?,
            },
            security: SecurityConfig {
                geoip_db_path: optional_var("GEOIP_DB_PATH"),
                geoip_cidr_file: optional_var("GEOIP_CIDR_FILE"),
                settings_cache_ttl_seconds: var_or("SETTINGS_CACHE_TTL_SECS", "30")?,
                cleanup_interval_seconds: var_or("BRUTE_FORCE_CLEANUP_INTERVAL_SECS", "300")?,
            },
            auth: AuthConfig {
                admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
                admin_password_hash: optional_var("ADMIN_PASSWORD_HASH"),
                jwt_secret: optional_var("JWT_SECRET"),
                session_ttl_hours: var_or("SESSION_TTL_HOURS", "12")?,
            },
        })
    }

    pub fn login_path(&self) -> String {
        format!("{}/login", self.server.base_path)
    }

    pub fn health_path(&self) -> String {
        format!("{}/_health", self.server.base_path)
    }

    /// Prefixes a route with the configured base path
    pub fn route(&self, path: &str) -> String {
        format!("{}{}", self.server.base_path, path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 5000,
                base_path: String::new(),
                trust_proxy: false,
                cors_allowed_origins: Vec::new(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                acquire_timeout_seconds: 5,
            },
            security: SecurityConfig {
                geoip_db_path: None,
                geoip_cidr_file: None,
                settings_cache_ttl_seconds: 30,
                cleanup_interval_seconds: 300,
            },
            auth: AuthConfig {
                admin_username: "admin".to_string(),
                admin_password_hash: None,
                jwt_secret: None,
                session_ttl_hours: 12,
            },
        }
    }
}
