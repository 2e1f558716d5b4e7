//! Relay configuration from environment variables
//!
//! ```bash
//! JWT_SECRET=your-super-secret-key-at-least-32-chars
//! PORT=3001
//! CLIENT_URL=http://localhost:5173,https://chat.example.com
//! RELAY_USERS=alice:Alice Liddell,bob:Bob
//! ```

use std::time::Duration;

use crate::relay::{ConnectionSettings, PresenceRelay};
use crate::types::UserId;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set")]
    MissingSecret,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Secret shared with the auth layer that issues session tokens
    pub jwt_secret: String,
    /// Browser origins allowed to connect (`*` allows any)
    pub allowed_origins: Vec<String>,
    /// Per-connection outbound queue bound
    pub outbound_buffer: usize,
    pub connection: ConnectionSettings,
    /// Users seeded into the in-memory directory
    pub users: Vec<(UserId, String)>,
    pub log_json: bool,
}

impl RelayConfig {
    pub const DEFAULT_PORT: u16 = 3001;
    pub const DEFAULT_CLIENT_URL: &'static str = "http://localhost:5173";

    /// Create a config with defaults and the given secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: Self::DEFAULT_PORT,
            jwt_secret: jwt_secret.into(),
            allowed_origins: vec![Self::DEFAULT_CLIENT_URL.to_string()],
            outbound_buffer: PresenceRelay::DEFAULT_OUTBOUND_CAPACITY,
            connection: ConnectionSettings::default(),
            users: Vec::new(),
            log_json: false,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup
    ///
    /// Keys:
    /// - JWT_SECRET (required)
    /// - RELAY_HOST, PORT
    /// - CLIENT_URL: comma-separated allowed origins
    /// - RELAY_OUTBOUND_BUFFER, RELAY_SEND_TIMEOUT_MS
    /// - RELAY_PING_INTERVAL_SECS, RELAY_PONG_TIMEOUT_SECS
    /// - RELAY_USERS: `id:Full Name` pairs, comma-separated
    /// - RELAY_LOG_JSON: `1` for JSON logs
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)?;

        let mut config = Self::new(secret);

        if let Some(host) = lookup("RELAY_HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&lookup, "PORT")? {
            config.port = port;
        }

        if let Some(origins) = lookup("CLIENT_URL") {
            let origins: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !origins.is_empty() {
                config.allowed_origins = origins;
            }
        }

        if let Some(buffer) = parse(&lookup, "RELAY_OUTBOUND_BUFFER")? {
            config.outbound_buffer = buffer;
        }
        if let Some(ms) = parse(&lookup, "RELAY_SEND_TIMEOUT_MS")? {
            config.connection.send_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse(&lookup, "RELAY_PING_INTERVAL_SECS")? {
            config.connection.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "RELAY_PONG_TIMEOUT_SECS")? {
            config.connection.pong_timeout = Duration::from_secs(secs);
        }

        // Format: "id1:Full Name,id2:Other Name"
        if let Some(users) = lookup("RELAY_USERS") {
            for entry in users.split(',') {
                match entry.trim().split_once(':') {
                    Some((id, name)) if !id.trim().is_empty() => {
                        config.users.push((UserId::new(id.trim()), name.trim().to_string()));
                    }
                    _ if entry.trim().is_empty() => {}
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            key: "RELAY_USERS",
                            value: entry.to_string(),
                        })
                    }
                }
            }
        }

        config.log_json = lookup("RELAY_LOG_JSON").as_deref() == Some("1");

        Ok(config)
    }

    /// Socket address string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether a browser origin may open a connection
    pub fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}
