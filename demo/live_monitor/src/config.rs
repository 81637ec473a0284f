use std::fs;
use std::path::Path;

use vigihome_core::config::ReconnectConfig;
use vigihome_core::LiveConfig;

/// High-level configuration for the live monitor demo
#[derive(Clone, Debug)]
pub struct LiveMonitorConfig {
    pub live: LiveConfig,
    pub credentials: Option<Credentials>,
    /// Ring the terminal bell on high-priority alerts
    pub bell: bool,
    /// Also mount the realtime summary and health status watchers
    pub summaries: bool,
}

#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Default for LiveMonitorConfig {
    fn default() -> Self {
        let email = std::env::var("VIGIHOME_EMAIL").ok().filter(|s| !s.is_empty());
        let password = std::env::var("VIGIHOME_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty());
        Self {
            live: LiveConfig::from_env(),
            credentials: email
                .zip(password)
                .map(|(email, password)| Credentials { email, password }),
            bell: std::env::var("LIVE_MONITOR_BELL")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            summaries: true,
        }
    }
}

impl LiveMonitorConfig {
    /// Load configuration from a TOML file (path via LIVE_MONITOR_CONFIG or ./live_monitor.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("LIVE_MONITOR_CONFIG").unwrap_or_else(|_| "live_monitor.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "live_monitor", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<LiveMonitorToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "live_monitor", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "live_monitor", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LiveMonitorToml {
    pub bell: Option<bool>,
    pub summaries: Option<bool>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub backend: Option<BackendToml>,
    pub reconnect: Option<ReconnectToml>,
}

impl LiveMonitorToml {
    fn overlay(self, mut base: LiveMonitorConfig) -> LiveMonitorConfig {
        if let Some(v) = self.bell {
            base.bell = v;
        }
        if let Some(v) = self.summaries {
            base.summaries = v;
        }
        if let (Some(email), Some(password)) = (self.email, self.password) {
            base.credentials = Some(Credentials { email, password });
        }
        if let Some(b) = self.backend {
            b.apply(&mut base.live);
        }
        if let Some(r) = self.reconnect {
            r.apply(&mut base.live.reconnect);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct BackendToml {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub summary_interval_secs: Option<u64>,
    pub status_interval_secs: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}
impl BackendToml {
    fn apply(self, c: &mut LiveConfig) {
        if let Some(v) = self.api_url {
            c.api_url = v;
        }
        if let Some(v) = self.ws_url {
            c.ws_url = v;
        }
        if let Some(v) = self.poll_interval_secs {
            c.poll_interval_secs = v;
        }
        if let Some(v) = self.summary_interval_secs {
            c.summary_interval_secs = v;
        }
        if let Some(v) = self.status_interval_secs {
            c.status_interval_secs = v;
        }
        if let Some(v) = self.request_timeout_ms {
            c.request_timeout_ms = v;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ReconnectToml {
    pub base_ms: Option<u64>,
    pub max_ms: Option<u64>,
    /// 0 disables the cap
    pub max_attempts: Option<u32>,
}
impl ReconnectToml {
    fn apply(self, r: &mut ReconnectConfig) {
        if let Some(v) = self.base_ms {
            r.base_ms = v;
        }
        if let Some(v) = self.max_ms {
            r.max_ms = v;
        }
        if let Some(v) = self.max_attempts {
            r.max_attempts = if v == 0 { None } else { Some(v) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_keeps_unset_fields() {
        let toml_src = r#"
            bell = false
            [backend]
            ws_url = "ws://monitor.local/monitoring/ws"
            [reconnect]
            max_attempts = 0
        "#;
        let parsed: LiveMonitorToml = toml::from_str(toml_src).unwrap();
        let base = LiveMonitorConfig {
            live: LiveConfig::default(),
            credentials: None,
            bell: true,
            summaries: true,
        };
        let cfg = parsed.overlay(base);
        assert!(!cfg.bell);
        assert!(cfg.summaries);
        assert_eq!(cfg.live.ws_url, "ws://monitor.local/monitoring/ws");
        assert_eq!(cfg.live.api_url, LiveConfig::default().api_url);
        assert_eq!(cfg.live.reconnect.max_attempts, None);
    }
}
