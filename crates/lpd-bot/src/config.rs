//! Application configuration.
//!
//! Resolution order: serde defaults, then the TOML file, then `LPD__`
//! environment overrides (`LPD__BRIDGE__PORT=9000`).

use crate::error::{AppError, AppResult};
use lpd_bridge::BridgeConfig;
use lpd_core::{default_categories, CategoryDef};
use lpd_persistence::DEFAULT_CAPACITY;
use lpd_ws::{ConnectionConfig, ReconnectPolicy, DEFAULT_SITE_PATTERNS};
use serde::{Deserialize, Serialize};

/// Feed connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Interval between `ping` literals (ms).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Upper bound for one connection attempt (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// A page known to be open at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialPage {
    pub id: String,
    pub url: String,
}

/// Persisted replay cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: String,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_path() -> String {
    "./data/token_cache.jsonl".to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            capacity: default_cache_capacity(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    lpd_telemetry::DEFAULT_LOG_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Feed WebSocket endpoint URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default)]
    pub websocket: WsConfig,
    /// Site URL globs whose pages make the feed worth subscribing to.
    #[serde(default = "default_sites")]
    pub sites: Vec<String>,
    #[serde(default)]
    pub initial_pages: Vec<InitialPage>,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryDef>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Buffer between the feed connection and the router.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_ws_url() -> String {
    "wss://launchpaddetectorbackend-dev.fly.dev".to_string()
}

fn default_sites() -> Vec<String> {
    DEFAULT_SITE_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_event_buffer() -> usize {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            websocket: WsConfig::default(),
            sites: default_sites(),
            initial_pages: Vec::new(),
            notifications_enabled: default_notifications_enabled(),
            categories: default_categories(),
            cache: CacheConfig::default(),
            bridge: BridgeConfig::default(),
            telemetry: TelemetryConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (optional) with `LPD__` environment overrides.
    pub fn load(path: &str) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LPD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Load from a specific TOML file, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let app: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.ws_url.is_empty() {
            return Err(AppError::Config("ws_url is empty".to_string()));
        }
        if self.cache.capacity == 0 {
            return Err(AppError::Config("cache.capacity must be positive".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(AppError::Config("event_buffer must be positive".to_string()));
        }
        for def in &self.categories {
            def.validate()
                .map_err(|e| AppError::Config(e.to_string()))?;
        }
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.ws_url.clone(),
            reconnect: self.websocket.reconnect.clone(),
            heartbeat_interval_ms: self.websocket.heartbeat_interval_ms,
            connect_timeout_ms: self.websocket.connect_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache.capacity, 300);
        assert_eq!(config.websocket.reconnect.base_delay_ms, 5_000);
        assert_eq!(config.websocket.heartbeat_interval_ms, 30_000);
        assert_eq!(config.bridge.port, 8787);
        assert_eq!(config.bridge.max_connections, 16);
        assert_eq!(config.categories.len(), 2);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r##"
ws_url = "ws://127.0.0.1:9001"
notifications_enabled = false

[websocket.reconnect]
multiplier = 2.0
jitter_ms = 250

[[categories]]
key = "pump"
label = "PUMP"
match_tokens = ["pump"]
color = "#00ff00"
"##
        )
        .unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.ws_url, "ws://127.0.0.1:9001");
        assert!(!config.notifications_enabled);
        assert_eq!(config.websocket.reconnect.base_delay_ms, 5_000);
        assert_eq!(config.websocket.reconnect.multiplier, 2.0);
        assert_eq!(config.categories.len(), 1);
        assert!(config.categories[0].enabled);
        assert_eq!(config.cache.path, "./data/token_cache.jsonl");
    }

    #[test]
    fn test_layered_load_without_file() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.ws_url, default_ws_url());
        assert_eq!(config.sites.len(), 2);
    }

    #[test]
    fn test_reserved_category_rejected() {
        let mut config = AppConfig::default();
        config.categories[0].key = lpd_core::CategoryKey::new("other");
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("ws_url"));
        assert!(toml_str.contains("[[categories]]"));
    }
}
