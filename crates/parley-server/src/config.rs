//! Server configuration.

use parley_settings::{AuthSettings, ServerSettings};
use serde::{Deserialize, Serialize};

/// Configuration for the Parley server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Require a valid token to open a chat socket.
    pub require_auth: bool,
    /// Broadcast `joined the chat` notices.
    pub announce_joins: bool,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Per-frame write timeout in milliseconds.
    pub send_timeout_ms: u64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close after this many seconds without inbound activity.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Session cookie name.
    pub cookie_name: String,
    /// Set the `Secure` attribute on the session cookie.
    pub secure_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            require_auth: true,
            announce_joins: false,
            send_queue_capacity: 256,
            send_timeout_ms: 5000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            cookie_name: "token".into(),
            secure_cookie: false,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(server: &ServerSettings, auth: &AuthSettings) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            require_auth: server.require_auth,
            announce_joins: server.announce_joins,
            send_queue_capacity: server.send_queue_capacity,
            send_timeout_ms: server.send_timeout_ms,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            max_message_size: server.max_message_size,
            cookie_name: auth.cookie_name.clone(),
            secure_cookie: auth.secure_cookie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_heartbeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
    }

    #[test]
    fn default_queue_and_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.send_queue_capacity, 256);
        assert_eq!(cfg.send_timeout_ms, 5000);
        assert_eq!(cfg.max_message_size, 65_536);
    }

    #[test]
    fn default_requires_auth_and_stays_quiet_on_join() {
        let cfg = ServerConfig::default();
        assert!(cfg.require_auth);
        assert!(!cfg.announce_joins);
        assert_eq!(cfg.cookie_name, "token");
    }

    #[test]
    fn from_settings_copies_fields() {
        let server = ServerSettings {
            port: 9001,
            announce_joins: true,
            require_auth: false,
            ..ServerSettings::default()
        };
        let auth = AuthSettings {
            cookie_name: "sid".into(),
            secure_cookie: true,
            ..AuthSettings::default()
        };
        let cfg = ServerConfig::from_settings(&server, &auth);
        assert_eq!(cfg.port, 9001);
        assert!(cfg.announce_joins);
        assert!(!cfg.require_auth);
        assert_eq!(cfg.cookie_name, "sid");
        assert!(cfg.secure_cookie);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_message_size, cfg.max_message_size);
    }
}
