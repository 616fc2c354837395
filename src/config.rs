//! Sync configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_CHANNEL_PATH: &str = "/ws";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL (expected http:// or https://): {0}")]
    InvalidBaseUrl(String),
}

/// Live-channel settings consumed by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Full WebSocket URL, e.g. `ws://host:8080/ws`.
    pub endpoint: String,
    /// Fixed wait between a transport closure and the next attempt.
    pub reconnect_delay: Duration,
    /// Attempts allowed per connection lifetime before giving up.
    pub max_reconnect_attempts: u32,
}

impl ChannelConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// HTTP API origin without trailing slash.
    pub base_url: String,
    pub channel: ChannelConfig,
    pub timeouts: HttpTimeouts,
}

impl SyncConfig {
    /// Defaults for everything except the API origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when `base_url` is not http(s).
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        let endpoint = channel_endpoint(&base_url, DEFAULT_CHANNEL_PATH)?;
        Ok(Self { base_url, channel: ChannelConfig::new(endpoint), timeouts: HttpTimeouts::default() })
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `BOARD_SYNC_BASE_URL`: default `http://127.0.0.1:8080`
    /// - `BOARD_SYNC_CHANNEL_PATH`: default `/ws`
    /// - `BOARD_SYNC_RECONNECT_DELAY_MS`: default 5000
    /// - `BOARD_SYNC_MAX_RECONNECT_ATTEMPTS`: default 5
    /// - `BOARD_SYNC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `BOARD_SYNC_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a non-http(s) base URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a non-http(s) base URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("BOARD_SYNC_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        let path = lookup("BOARD_SYNC_CHANNEL_PATH").unwrap_or_else(|| DEFAULT_CHANNEL_PATH.to_owned());

        let channel = ChannelConfig {
            endpoint: channel_endpoint(&base_url, &path)?,
            reconnect_delay: Duration::from_millis(parse_or(
                lookup("BOARD_SYNC_RECONNECT_DELAY_MS").as_deref(),
                DEFAULT_RECONNECT_DELAY_MS,
            )),
            max_reconnect_attempts: parse_or(
                lookup("BOARD_SYNC_MAX_RECONNECT_ATTEMPTS").as_deref(),
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
        };
        let timeouts = HttpTimeouts {
            request_secs: parse_or(lookup("BOARD_SYNC_REQUEST_TIMEOUT_SECS").as_deref(), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(lookup("BOARD_SYNC_CONNECT_TIMEOUT_SECS").as_deref(), DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { base_url, channel, timeouts })
    }
}

/// Derive the WebSocket URL from the HTTP origin.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBaseUrl`] when `base_url` is not http(s).
pub fn channel_endpoint(base_url: &str, path: &str) -> Result<String, ConfigError> {
    let base_url = base_url.trim_end_matches('/');
    let path = path.trim();
    let sep = if path.starts_with('/') { "" } else { "/" };

    if let Some(rest) = base_url.strip_prefix("http://") {
        return Ok(format!("ws://{rest}{sep}{path}"));
    }
    if let Some(rest) = base_url.strip_prefix("https://") {
        return Ok(format!("wss://{rest}{sep}{path}"));
    }

    Err(ConfigError::InvalidBaseUrl(base_url.to_owned()))
}

fn parse_or<T>(raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr,
{
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
