//! Configuration management for the CleverMCP gateway
//!
//! Default config location: ./clevermcp.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub clever: CleverConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Maximum request body size in bytes (default: 1MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            tls: TlsConfig::default(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin, or list specific origins.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tls_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_tls_key_path")]
    pub key_path: PathBuf,
}

fn default_tls_cert_path() -> PathBuf {
    PathBuf::from("./conf/tls/cert.pem")
}

fn default_tls_key_path() -> PathBuf {
    PathBuf::from("./conf/tls/key.pem")
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: default_tls_cert_path(),
            key_path: default_tls_key_path(),
        }
    }
}

/// Protocol-level settings announced by `initialize` and used by the SSE transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpConfig {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// Seconds between SSE heartbeat frames
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Upper bound on concurrently open SSE streams
    #[serde(default = "default_max_sse_sessions")]
    pub max_sse_sessions: usize,
}

fn default_protocol_version() -> String {
    "2024-11-05".to_string()
}

fn default_server_name() -> String {
    "CleverMCP".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_max_sse_sessions() -> usize {
    100
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            server_name: default_server_name(),
            server_version: default_server_version(),
            keep_alive_secs: default_keep_alive_secs(),
            max_sse_sessions: default_max_sse_sessions(),
        }
    }
}

impl McpConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

/// Clever REST API client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleverConfig {
    #[serde(default = "default_clever_base_url")]
    pub base_url: String,
    /// Bearer token. Prefer `token_env` so the secret stays out of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable consulted when `token` is not set
    #[serde(default = "default_clever_token_env")]
    pub token_env: String,
    #[serde(default = "default_clever_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_clever_base_url() -> String {
    "https://api.clever.com/v3.0".to_string()
}

fn default_clever_token_env() -> String {
    "CLEVER_API_TOKEN".to_string()
}

fn default_clever_timeout_ms() -> u64 {
    10_000
}

impl Default for CleverConfig {
    fn default() -> Self {
        Self {
            base_url: default_clever_base_url(),
            token: None,
            token_env: default_clever_token_env(),
            timeout_ms: default_clever_timeout_ms(),
        }
    }
}

impl CleverConfig {
    /// Token from the config file, falling back to the `token_env` variable.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevicesConfig {
    /// SQLite database holding `applications` and `device_apps`
    #[serde(default = "default_devices_db_path")]
    pub db_path: PathBuf,
}

fn default_devices_db_path() -> PathBuf {
    PathBuf::from("devices.db")
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            db_path: default_devices_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log filter directives; takes precedence over `[logging] level` when set.
    /// Override with RUST_LOG env var
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Serve Prometheus metrics on this address (disabled when unset)
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: None,
            metrics_addr: None,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.expand_paths()?;
            Ok(config)
        } else {
            let mut config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = config.save(config_path) {
                tracing::warn!("Could not write default config to {:?}: {}", config_path, e);
            }
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Filter directives for the log subscriber when RUST_LOG is unset
    pub fn log_filter(&self) -> &str {
        self.observability
            .log_level
            .as_deref()
            .unwrap_or(&self.logging.level)
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.devices.db_path = expand_tilde(&self.devices.db_path)?;
        if self.server.tls.enabled {
            self.server.tls.cert_path = expand_tilde(&self.server.tls.cert_path)?;
            self.server.tls.key_path = expand_tilde(&self.server.tls.key_path)?;
        }
        if let Some(ref f) = self.logging.file {
            self.logging.file = Some(expand_tilde(f)?);
        }
        Ok(())
    }
}
