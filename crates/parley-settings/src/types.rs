//! Settings types.
//!
//! JSON keys are camelCase. Every group carries `#[serde(default)]` so a
//! partial file only needs the keys it changes.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{Result, SettingsError};

/// Lowest bcrypt cost accepted.
pub const MIN_BCRYPT_COST: u32 = 4;
/// Highest bcrypt cost accepted.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Root settings object.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Listener and channel behavior.
    pub server: ServerSettings,
    /// Passwords, tokens, and cookies.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and channel settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// Whether `/ws` connections must present a valid token.
    pub require_auth: bool,
    /// Broadcast a notice when a client joins.
    pub announce_joins: bool,
    /// Outbound frames buffered per connection before it is evicted.
    pub send_queue_capacity: usize,
    /// Per-frame write timeout.
    pub send_timeout_ms: u64,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            require_auth: true,
            announce_joins: false,
            send_queue_capacity: 256,
            send_timeout_ms: 5000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
        }
    }
}

/// Authentication settings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 signing secret. Never written back out.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub secret_key: Option<SecretString>,
    /// Token lifetime in minutes.
    pub token_ttl_minutes: i64,
    /// bcrypt work factor for new registrations.
    pub bcrypt_cost: u32,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Mark the session cookie `Secure`.
    pub secure_cookie: bool,
    /// Accounts preloaded at startup.
    pub users: Vec<SeedUser>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_ttl_minutes: 30,
            bcrypt_cost: 12,
            cookie_name: "token".to_string(),
            secure_cookie: false,
            users: Vec::new(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// A preloaded account. The password is stored only as a bcrypt hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    /// Login name.
    pub username: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ParleySettings {
    /// The signing secret, or [`SettingsError::MissingSecret`] if unset or empty.
    pub fn require_secret(&self) -> Result<&SecretString> {
        match &self.auth.secret_key {
            Some(secret) if !secret.expose_secret().is_empty() => Ok(secret),
            _ => Err(SettingsError::MissingSecret),
        }
    }

    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if server.heartbeat_timeout_secs <= server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must exceed heartbeatIntervalSecs".into(),
            ));
        }
        if server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be at least 1".into(),
            ));
        }
        if self.auth.token_ttl_minutes <= 0 {
            return Err(SettingsError::InvalidValue(
                "auth.tokenTtlMinutes must be positive".into(),
            ));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            return Err(SettingsError::InvalidValue(format!(
                "auth.bcryptCost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}"
            )));
        }
        if self.auth.cookie_name.is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.cookieName must not be empty".into(),
            ));
        }
        // Unknown-user logins hash at bcryptCost, so seeds must match it.
        for (i, user) in self.auth.users.iter().enumerate() {
            let Some(cost) = bcrypt_hash_cost(&user.password_hash) else {
                return Err(SettingsError::InvalidValue(format!(
                    "auth.users[{i}] ({}) passwordHash is not a bcrypt hash",
                    user.username
                )));
            };
            if cost != self.auth.bcrypt_cost {
                return Err(SettingsError::InvalidValue(format!(
                    "auth.users[{i}] ({}) hash cost {cost} does not match auth.bcryptCost {}",
                    user.username, self.auth.bcrypt_cost
                )));
            }
        }
        Ok(())
    }
}

/// Cost field of a modular-crypt bcrypt hash (`$2b$12$...`).
fn bcrypt_hash_cost(hash: &str) -> Option<u32> {
    let mut parts = hash.split('$');
    if !parts.next()?.is_empty() {
        return None;
    }
    let variant = parts.next()?;
    if !matches!(variant, "2a" | "2b" | "2x" | "2y") {
        return None;
    }
    let cost = parts.next()?;
    let rest = parts.next()?;
    if cost.len() != 2 || rest.is_empty() || parts.next().is_some() {
        return None;
    }
    cost.parse().ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
