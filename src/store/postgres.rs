use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration as StdDuration;
use tracing::info;
use uuid::Uuid;

use wg_shared::config::DatabaseConfig;
use wg_shared::{
    ApiAccessLog, ApiKey, BruteForceAttempt, GeoIpAction, GeoIpRule, IpBlock, SecurityEvent,
    SecurityEventType, SecuritySettings,
};

use super::{AttemptUpdate, SecurityStore, StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS security_settings (
        id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        brute_force_enabled BOOLEAN NOT NULL,
        brute_force_max_attempts INTEGER NOT NULL,
        brute_force_window_minutes INTEGER NOT NULL,
        brute_force_block_minutes INTEGER NOT NULL,
        ip_blocking_enabled BOOLEAN NOT NULL,
        geoip_enabled BOOLEAN NOT NULL,
        geoip_default_action TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ip_blocks (
        id UUID PRIMARY KEY,
        ip TEXT NOT NULL UNIQUE,
        reason TEXT NOT NULL,
        blocked_by TEXT NOT NULL,
        permanent BOOLEAN NOT NULL,
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS geoip_rules (
        id UUID PRIMARY KEY,
        country_code TEXT NOT NULL UNIQUE,
        country_name TEXT NOT NULL,
        action TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS brute_force_attempts (
        ip TEXT PRIMARY KEY,
        attempts INTEGER NOT NULL,
        last_attempt TIMESTAMPTZ NOT NULL,
        blocked_until TIMESTAMPTZ
    )"#,
    r#"CREATE TABLE IF NOT EXISTS security_events (
        id UUID PRIMARY KEY,
        event_type TEXT NOT NULL,
        ip TEXT NOT NULL,
        country TEXT,
        username TEXT,
        description TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_security_events_created_at ON security_events (created_at DESC)",
    r#"CREATE TABLE IF NOT EXISTS api_keys (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        key_digest TEXT NOT NULL UNIQUE,
        key_prefix TEXT NOT NULL,
        permissions TEXT[] NOT NULL,
        enabled BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        last_used_at TIMESTAMPTZ
    )"#,
    r#"CREATE TABLE IF NOT EXISTS api_access_logs (
        id UUID PRIMARY KEY,
        api_key_id UUID NOT NULL,
        api_key_name TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        method TEXT NOT NULL,
        ip_address TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        status_code INTEGER NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_api_access_logs_key ON api_access_logs (api_key_id, timestamp DESC)",
];

const EVENT_COLUMNS: &str = "id, event_type, ip, country, username, description, created_at";
const API_KEY_COLUMNS: &str =
    "id, name, key_digest, key_prefix, permissions, enabled, created_at, updated_at, last_used_at";
const ACCESS_LOG_COLUMNS: &str =
    "id, api_key_id, api_key_name, endpoint, method, ip_address, user_agent, status_code, timestamp";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!("🔧 Creating database pool with {} max connections", config.max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(StdDuration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(StdDuration::from_secs(300))
            .max_lifetime(StdDuration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        info!("✅ Database pool created successfully");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the security tables when missing
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("✅ Security schema ready");
        Ok(())
    }
}

fn to_db_int(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} does not fit INTEGER", value)))
}

fn from_db_int(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn settings_from_row(row: &PgRow) -> StoreResult<SecuritySettings> {
    let action: String = row.try_get("geoip_default_action")?;
    Ok(SecuritySettings {
        brute_force_enabled: row.try_get("brute_force_enabled")?,
        brute_force_max_attempts: from_db_int(row.try_get("brute_force_max_attempts")?, "max_attempts")?,
        brute_force_window_minutes: from_db_int(row.try_get("brute_force_window_minutes")?, "window_minutes")?,
        brute_force_block_minutes: from_db_int(row.try_get("brute_force_block_minutes")?, "block_minutes")?,
        ip_blocking_enabled: row.try_get("ip_blocking_enabled")?,
        geoip_enabled: row.try_get("geoip_enabled")?,
        geoip_default_action: action
            .parse::<GeoIpAction>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ip_block_from_row(row: &PgRow) -> StoreResult<IpBlock> {
    Ok(IpBlock {
        id: row.try_get("id")?,
        ip: row.try_get("ip")?,
        reason: row.try_get("reason")?,
        blocked_by: row.try_get("blocked_by")?,
        permanent: row.try_get("permanent")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn geoip_rule_from_row(row: &PgRow) -> StoreResult<GeoIpRule> {
    let action: String = row.try_get("action")?;
    Ok(GeoIpRule {
        id: row.try_get("id")?,
        country_code: row.try_get("country_code")?,
        country_name: row.try_get("country_name")?,
        action: action
            .parse::<GeoIpAction>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn attempt_from_row(row: &PgRow) -> StoreResult<BruteForceAttempt> {
    Ok(BruteForceAttempt {
        ip: row.try_get("ip")?,
        attempts: from_db_int(row.try_get("attempts")?, "attempts")?,
        last_attempt: row.try_get("last_attempt")?,
        blocked_until: row.try_get("blocked_until")?,
    })
}

fn event_from_row(row: &PgRow) -> StoreResult<SecurityEvent> {
    let event_type: String = row.try_get("event_type")?;
    Ok(SecurityEvent {
        id: row.try_get("id")?,
        event_type: event_type
            .parse::<SecurityEventType>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        ip: row.try_get("ip")?,
        country: row.try_get("country")?,
        username: row.try_get("username")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn api_key_from_row(row: &PgRow) -> StoreResult<ApiKey> {
    Ok(ApiKey {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        key: row.try_get("key_digest")?,
        key_prefix: row.try_get("key_prefix")?,
        permissions: row.try_get("permissions")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_used_at: row.try_get("last_used_at")?,
    })
}

fn access_log_from_row(row: &PgRow) -> StoreResult<ApiAccessLog> {
    let status: i32 = row.try_get("status_code")?;
    Ok(ApiAccessLog {
        id: row.try_get("id")?,
        api_key_id: row.try_get("api_key_id")?,
        api_key_name: row.try_get("api_key_name")?,
        endpoint: row.try_get("endpoint")?,
        method: row.try_get("method")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        status_code: u16::try_from(status)
            .map_err(|_| StoreError::Corrupt(format!("status code {}", status)))?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

fn require_affected(rows: u64, resource: &str) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound(resource.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl SecurityStore for PgStore {
    async fn get_security_settings(&self) -> StoreResult<Option<SecuritySettings>> {
        let row = sqlx::query("SELECT * FROM security_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(settings_from_row).transpose()
    }

    async fn save_security_settings(&self, settings: &SecuritySettings) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO security_settings (
                id, brute_force_enabled, brute_force_max_attempts, brute_force_window_minutes,
                brute_force_block_minutes, ip_blocking_enabled, geoip_enabled,
                geoip_default_action, updated_at
            ) VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                brute_force_enabled = EXCLUDED.brute_force_enabled,
                brute_force_max_attempts = EXCLUDED.brute_force_max_attempts,
                brute_force_window_minutes = EXCLUDED.brute_force_window_minutes,
                brute_force_block_minutes = EXCLUDED.brute_force_block_minutes,
                ip_blocking_enabled = EXCLUDED.ip_blocking_enabled,
                geoip_enabled = EXCLUDED.geoip_enabled,
                geoip_default_action = EXCLUDED.geoip_default_action,
                updated_at = EXCLUDED.updated_at"#,
        )
        .bind(settings.brute_force_enabled)
        .bind(to_db_int(settings.brute_force_max_attempts)?)
        .bind(to_db_int(settings.brute_force_window_minutes)?)
        .bind(to_db_int(settings.brute_force_block_minutes)?)
        .bind(settings.ip_blocking_enabled)
        .bind(settings.geoip_enabled)
        .bind(settings.geoip_default_action.as_str())
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_ip_blocks(&self) -> StoreResult<Vec<IpBlock>> {
        let rows = sqlx::query("SELECT * FROM ip_blocks ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        collect(rows, ip_block_from_row)
    }

    async fn get_ip_block_by_ip(&self, ip: &str) -> StoreResult<Option<IpBlock>> {
        let row = sqlx::query("SELECT * FROM ip_blocks WHERE ip = $1")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ip_block_from_row).transpose()
    }

    async fn save_ip_block(&self, block: &IpBlock) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO ip_blocks (id, ip, reason, blocked_by, permanent, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (ip) DO UPDATE SET
                id = EXCLUDED.id,
                reason = EXCLUDED.reason,
                blocked_by = EXCLUDED.blocked_by,
                permanent = EXCLUDED.permanent,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at"#,
        )
        .bind(block.id)
        .bind(&block.ip)
        .bind(&block.reason)
        .bind(&block.blocked_by)
        .bind(block.permanent)
        .bind(block.expires_at)
        .bind(block.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_ip_block(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM ip_blocks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_affected(result.rows_affected(), "IP block")
    }

    async fn purge_expired_ip_blocks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM ip_blocks WHERE NOT permanent AND (expires_at IS NULL OR expires_at <= $1)",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_geoip_rules(&self) -> StoreResult<Vec<GeoIpRule>> {
        let rows = sqlx::query("SELECT * FROM geoip_rules ORDER BY country_code")
            .fetch_all(&self.pool)
            .await?;
        collect(rows, geoip_rule_from_row)
    }

    async fn get_geoip_rule_by_country(&self, country_code: &str) -> StoreResult<Option<GeoIpRule>> {
        let row = sqlx::query("SELECT * FROM geoip_rules WHERE country_code = $1")
            .bind(country_code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(geoip_rule_from_row).transpose()
    }

    async fn save_geoip_rule(&self, rule: &GeoIpRule) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO geoip_rules (id, country_code, country_name, action, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (country_code) DO UPDATE SET
                id = EXCLUDED.id,
                country_name = EXCLUDED.country_name,
                action = EXCLUDED.action,
                created_by = EXCLUDED.created_by,
                created_at = EXCLUDED.created_at"#,
        )
        .bind(rule.id)
        .bind(&rule.country_code)
        .bind(&rule.country_name)
        .bind(rule.action.as_str())
        .bind(&rule.created_by)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_geoip_rule(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM geoip_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_affected(result.rows_affected(), "GeoIP rule")
    }

    async fn get_brute_force_attempt(&self, ip: &str) -> StoreResult<Option<BruteForceAttempt>> {
        let row = sqlx::query("SELECT * FROM brute_force_attempts WHERE ip = $1")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(attempt_from_row).transpose()
    }

    async fn save_brute_force_attempt(&self, attempt: &BruteForceAttempt) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO brute_force_attempts (ip, attempts, last_attempt, blocked_until)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ip) DO UPDATE SET
                attempts = EXCLUDED.attempts,
                last_attempt = EXCLUDED.last_attempt,
                blocked_until = EXCLUDED.blocked_until"#,
        )
        .bind(&attempt.ip)
        .bind(to_db_int(attempt.attempts)?)
        .bind(attempt.last_attempt)
        .bind(attempt.blocked_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_brute_force_attempt(
        &self,
        ip: &str,
        update: &AttemptUpdate,
    ) -> StoreResult<BruteForceAttempt> {
        let mut tx = self.pool.begin().await?;

        // Placeholder row so that the row lock below also covers first-time IPs.
        let created = sqlx::query(
            "INSERT INTO brute_force_attempts (ip, attempts, last_attempt) VALUES ($1, 0, NOW())
             ON CONFLICT (ip) DO NOTHING",
        )
        .bind(ip)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let row = sqlx::query("SELECT * FROM brute_force_attempts WHERE ip = $1 FOR UPDATE")
            .bind(ip)
            .fetch_one(&mut *tx)
            .await?;
        let current = if created { None } else { Some(attempt_from_row(&row)?) };

        let next = update(current);
        sqlx::query(
            "UPDATE brute_force_attempts SET attempts = $2, last_attempt = $3, blocked_until = $4 WHERE ip = $1",
        )
        .bind(ip)
        .bind(to_db_int(next.attempts)?)
        .bind(next.last_attempt)
        .bind(next.blocked_until)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(next)
    }

    async fn delete_brute_force_attempt(&self, ip: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM brute_force_attempts WHERE ip = $1")
            .bind(ip)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_expired_brute_force_attempts(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM brute_force_attempts
            WHERE (blocked_until IS NULL OR blocked_until <= $1)
              AND last_attempt <= $2"#,
        )
        .bind(now)
        .bind(now - window)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn save_security_event(&self, event: &SecurityEvent) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO security_events ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(&event.ip)
        .bind(&event.country)
        .bind(&event.username)
        .bind(&event.description)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_security_events(&self, limit: usize) -> StoreResult<Vec<SecurityEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM security_events ORDER BY created_at DESC LIMIT $1",
            EVENT_COLUMNS
        ))
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, event_from_row)
    }

    async fn get_security_events_by_type(
        &self,
        event_type: SecurityEventType,
        limit: usize,
    ) -> StoreResult<Vec<SecurityEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM security_events WHERE event_type = $1 ORDER BY created_at DESC LIMIT $2",
            EVENT_COLUMNS
        ))
        .bind(event_type.as_str())
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, event_from_row)
    }

    async fn get_api_keys(&self) -> StoreResult<Vec<ApiKey>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_keys ORDER BY created_at DESC",
            API_KEY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, api_key_from_row)
    }

    async fn get_api_key_by_id(&self, id: Uuid) -> StoreResult<Option<ApiKey>> {
        let row = sqlx::query(&format!("SELECT {} FROM api_keys WHERE id = $1", API_KEY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn get_api_key_by_key(&self, digest: &str) -> StoreResult<Option<ApiKey>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM api_keys WHERE key_digest = $1",
            API_KEY_COLUMNS
        ))
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn save_api_key(&self, key: &ApiKey) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_digest, key_prefix, permissions, enabled,
                created_at, updated_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                permissions = EXCLUDED.permissions,
                enabled = EXCLUDED.enabled,
                updated_at = EXCLUDED.updated_at,
                last_used_at = EXCLUDED.last_used_at"#,
        )
        .bind(key.id)
        .bind(&key.name)
        .bind(&key.key)
        .bind(&key.key_prefix)
        .bind(&key.permissions)
        .bind(key.enabled)
        .bind(key.created_at)
        .bind(key.updated_at)
        .bind(key.last_used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_api_key(&self, id: Uuid, used_at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(used_at)
            .execute(&self.pool)
            .await?;
        require_affected(result.rows_affected(), "API key")
    }

    async fn delete_api_key(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_affected(result.rows_affected(), "API key")
    }

    async fn save_api_access_log(&self, log: &ApiAccessLog) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO api_access_logs ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            ACCESS_LOG_COLUMNS
        ))
        .bind(log.id)
        .bind(log.api_key_id)
        .bind(&log.api_key_name)
        .bind(&log.endpoint)
        .bind(&log.method)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(i32::from(log.status_code))
        .bind(log.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_api_access_logs(&self, limit: usize) -> StoreResult<Vec<ApiAccessLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_access_logs ORDER BY timestamp DESC LIMIT $1",
            ACCESS_LOG_COLUMNS
        ))
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, access_log_from_row)
    }

    async fn get_api_access_logs_by_key_id(
        &self,
        api_key_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ApiAccessLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_access_logs WHERE api_key_id = $1 ORDER BY timestamp DESC LIMIT $2",
            ACCESS_LOG_COLUMNS
        ))
        .bind(api_key_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(rows, access_log_from_row)
    }
}
