//! Client configuration parsed from environment variables.
//!
//! Every value has a default matching the backend's development setup, so an
//! empty environment yields a working local configuration.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5001/api";
pub const DEFAULT_SOCKET_URL: &str = "http://localhost:5001";
pub const DEFAULT_TRANSPORTS: &str = "websocket,polling";
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_TYPING_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// File name of the persisted bearer token inside the data directory.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// Realtime transports in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

/// Bounded reconnection with capped exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub delay_max: Duration,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): `delay * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self.delay.saturating_mul(1_u32 << exponent);
        scaled.min(self.delay_max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            delay_max: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MAX_MS),
        }
    }
}

/// Settings for one realtime transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub socket_url: String,
    pub transports: Vec<TransportKind>,
    pub reconnect: ReconnectPolicy,
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_owned(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub token_path: PathBuf,
    pub request_timeout: Duration,
    pub typing_timeout: Duration,
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `CHAT_API_URL`: REST base URL, default `http://localhost:5001/api`
    /// - `CHAT_SOCKET_URL`: realtime base URL, default `http://localhost:5001`
    /// - `CHAT_TOKEN_PATH`: token file, default `<data dir>/token`
    /// - `CHAT_TRANSPORTS`: comma list, default `websocket,polling`
    /// - `CHAT_RECONNECT_ATTEMPTS`: default 5
    /// - `CHAT_RECONNECT_DELAY_MS` / `CHAT_RECONNECT_DELAY_MAX_MS`: default 1000 / 5000
    /// - `CHAT_HANDSHAKE_TIMEOUT_SECS`: default 20
    /// - `CHAT_TYPING_TIMEOUT_MS`: default 3000
    /// - `CHAT_REQUEST_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for an unknown transport name.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env_url("CHAT_API_URL", DEFAULT_API_URL);
        let socket_url = env_url("CHAT_SOCKET_URL", DEFAULT_SOCKET_URL);
        let token_path = std::env::var("CHAT_TOKEN_PATH").map_or_else(|_| default_token_path(), PathBuf::from);
        let transports =
            parse_transports(&std::env::var("CHAT_TRANSPORTS").unwrap_or_else(|_| DEFAULT_TRANSPORTS.to_owned()))?;

        let reconnect = ReconnectPolicy {
            attempts: env_parse("CHAT_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS),
            delay: Duration::from_millis(env_parse("CHAT_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)),
            delay_max: Duration::from_millis(env_parse("CHAT_RECONNECT_DELAY_MAX_MS", DEFAULT_RECONNECT_DELAY_MAX_MS)),
        };

        Ok(Self {
            api_url,
            token_path,
            request_timeout: Duration::from_secs(env_parse("CHAT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)),
            typing_timeout: Duration::from_millis(env_parse("CHAT_TYPING_TIMEOUT_MS", DEFAULT_TYPING_TIMEOUT_MS)),
            transport: TransportConfig {
                socket_url,
                transports,
                reconnect,
                handshake_timeout: Duration::from_secs(env_parse(
                    "CHAT_HANDSHAKE_TIMEOUT_SECS",
                    DEFAULT_HANDSHAKE_TIMEOUT_SECS,
                )),
            },
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            token_path: default_token_path(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            typing_timeout: Duration::from_millis(DEFAULT_TYPING_TIMEOUT_MS),
            transport: TransportConfig::default(),
        }
    }
}

/// `<platform data dir>/token`, or `./.chat-client/token` when no home directory exists.
#[must_use]
pub fn default_token_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "chat-client").map_or_else(
        || PathBuf::from(".chat-client").join(TOKEN_KEY),
        |dirs| dirs.data_dir().join(TOKEN_KEY),
    )
}

fn env_url(key: &str, default: &str) -> String {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_owned())
        .trim_end_matches('/')
        .to_owned()
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated transport list, ignoring blanks and duplicates.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for names other than `websocket` and `polling`.
pub fn parse_transports(raw: &str) -> Result<Vec<TransportKind>, ConfigError> {
    let mut out = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = match name {
            "websocket" => TransportKind::WebSocket,
            "polling" => TransportKind::Polling,
            other => return Err(ConfigError::Parse(format!("unknown transport: {other}"))),
        };
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
