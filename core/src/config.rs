// Runtime configuration for the live feeds
//
// Defaults match the VigiHome backend on localhost; every field can be overridden by env.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect policy for the live socket
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// First retry delay in milliseconds
    pub base_ms: u64,
    /// Upper bound on any single retry delay
    pub max_ms: u64,
    /// Give up after this many consecutive failed attempts (None = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 30_000,
            max_attempts: Some(8),
        }
    }
}

/// Live feed configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LiveConfig {
    /// REST base URL
    pub api_url: String,
    /// WebSocket endpoint for pushed events
    pub ws_url: String,
    /// Poll interval for live list views
    pub poll_interval_secs: u64,
    /// Poll interval for the realtime monitoring summary
    pub summary_interval_secs: u64,
    /// Poll interval for the cached health status lookup
    pub status_interval_secs: u64,
    /// HTTP client timeout
    pub request_timeout_ms: u64,
    /// User agent sent on every request
    pub user_agent: String,
    /// Command queue depth per live view
    pub command_capacity: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/monitoring/ws".to_string(),
            poll_interval_secs: 15,
            summary_interval_secs: 15,
            status_interval_secs: 300,
            request_timeout_ms: 10_000,
            user_agent: "vigihome-live/0.1".to_string(),
            command_capacity: 256,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl LiveConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_url: env_string("VIGIHOME_API_URL").unwrap_or(default.api_url),
            ws_url: env_string("VIGIHOME_WS_URL").unwrap_or(default.ws_url),
            poll_interval_secs: env_parse("VIGIHOME_POLL_INTERVAL_SECS")
                .unwrap_or(default.poll_interval_secs),
            summary_interval_secs: env_parse("VIGIHOME_SUMMARY_INTERVAL_SECS")
                .unwrap_or(default.summary_interval_secs),
            status_interval_secs: env_parse("VIGIHOME_STATUS_INTERVAL_SECS")
                .unwrap_or(default.status_interval_secs),
            request_timeout_ms: env_parse("VIGIHOME_REQUEST_TIMEOUT_MS")
                .unwrap_or(default.request_timeout_ms),
            user_agent: default.user_agent,
            command_capacity: default.command_capacity,
            reconnect: ReconnectConfig {
                base_ms: env_parse("VIGIHOME_RECONNECT_BASE_MS")
                    .unwrap_or(default.reconnect.base_ms),
                max_ms: env_parse("VIGIHOME_RECONNECT_MAX_MS").unwrap_or(default.reconnect.max_ms),
                // 0 disables the attempt limit
                max_attempts: match env_parse::<u32>("VIGIHOME_RECONNECT_MAX_ATTEMPTS") {
                    Some(0) => None,
                    Some(n) => Some(n),
                    None => default.reconnect.max_attempts,
                },
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs.max(1))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
