use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::ratelimit::RateLimitConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Per-connection resources owned by the collaboration hub
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Capacity of each connection's outbound frame queue
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    /// Close a connection after this many seconds without inbound frames (0 disables)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl HubConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping, 0 disables)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

/// Which tokio scheduler services the connections.
///
/// Both flavors share the same locking discipline: registries are sharded
/// `DashMap`s whose locks are only held for the duration of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFlavor {
    #[default]
    MultiThread,
    CurrentThread,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub flavor: RuntimeFlavor,
    /// Worker thread count for the multi-threaded flavor (defaults to CPU count)
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Seconds to wait for sessions to drain after close frames are queued
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_channel_buffer_size() -> usize {
    64
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_drain_timeout() -> u64 {
    10
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("rate_limit.enabled", true)?
            .set_default("hub.idle_timeout_secs", 300)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("logging.level", "info")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // COLLAB_SERVER__PORT, COLLAB_RATE_LIMIT__BURST_SIZE, COLLAB_SERVER__CORS_ORIGINS=a,b ...
            .add_source(
                Environment::with_prefix("COLLAB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            // Bare PORT and CORS_ORIGIN, as set by hosting platforms
            .set_override_option("server.port", legacy_port(env_lookup)?)?
            .set_override_option("server.cors_origins", legacy_cors_origins(env_lookup))?;

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer_size(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// `PORT`, unless `COLLAB_SERVER__PORT` is set
fn legacy_port(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<i64>, ConfigError> {
    if lookup("COLLAB_SERVER__PORT").is_some() {
        return Ok(None);
    }
    lookup("PORT")
        .map(|raw| {
            raw.trim()
                .parse::<u16>()
                .map(i64::from)
                .map_err(|e| ConfigError::Message(format!("invalid PORT {:?}: {}", raw, e)))
        })
        .transpose()
}

/// Comma-separated `CORS_ORIGIN`, unless `COLLAB_SERVER__CORS_ORIGINS` is set
fn legacy_cors_origins(lookup: impl Fn(&str) -> Option<String>) -> Option<Vec<String>> {
    if lookup("COLLAB_SERVER__CORS_ORIGINS").is_some() {
        return None;
    }
    let origins: Vec<String> = lookup("CORS_ORIGIN")?
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();
    (!origins.is_empty()).then_some(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8000);
        assert!(server.cors_origins.is_empty());
    }

    #[test]
    fn test_idle_timeout_zero_disables() {
        let hub = HubConfig {
            idle_timeout_secs: 0,
            ..HubConfig::default()
        };
        assert!(hub.idle_timeout().is_none());
        assert_eq!(
            HubConfig::default().idle_timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_runtime_flavor_deserialize() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"flavor":"current_thread"}"#).unwrap();
        assert_eq!(config.flavor, RuntimeFlavor::CurrentThread);
        assert!(config.worker_threads.is_none());
        assert_eq!(RuntimeConfig::default().flavor, RuntimeFlavor::MultiThread);
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_legacy_port_alias() {
        assert_eq!(legacy_port(vars(&[("PORT", "9001")])).unwrap(), Some(9001));
        assert_eq!(legacy_port(vars(&[])).unwrap(), None);
        // The prefixed variable wins
        assert_eq!(
            legacy_port(vars(&[("PORT", "9001"), ("COLLAB_SERVER__PORT", "7000")])).unwrap(),
            None
        );
        assert!(legacy_port(vars(&[("PORT", "http")])).is_err());
    }

    #[test]
    fn test_legacy_cors_origin_alias() {
        assert_eq!(
            legacy_cors_origins(vars(&[(
                "CORS_ORIGIN",
                "http://localhost:3000, https://app.example.com,,"
            )])),
            Some(vec![
                "http://localhost:3000".to_string(),
                "https://app.example.com".to_string(),
            ])
        );
        assert_eq!(legacy_cors_origins(vars(&[("CORS_ORIGIN", " , ")])), None);
        assert_eq!(
            legacy_cors_origins(vars(&[
                ("CORS_ORIGIN", "http://a"),
                ("COLLAB_SERVER__CORS_ORIGINS", "http://b"),
            ])),
            None
        );
    }
}
