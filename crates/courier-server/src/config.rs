//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (COURIER_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use courier_auth::CredentialSource;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Realtime channel configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Allowed CORS origin for browser clients.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: Option<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL.
    #[serde(default = "default_database_url")]
    pub url: String,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Process-wide token signing secret. Initialized once at startup,
    /// never mutated.
    #[serde(default = "default_auth_secret")]
    pub secret: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Credential locations tried in order during the realtime handshake.
    #[serde(default = "default_credential_sources")]
    pub sources: Vec<CredentialSource>,
}

/// Realtime channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Heartbeat interval advertised to clients, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u32,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("COURIER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("COURIER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8747)
}

fn default_true() -> bool {
    true
}

fn default_database_url() -> String {
    std::env::var("COURIER_DATABASE_URL").unwrap_or_else(|_| "sqlite://courier.db".to_string())
}

fn default_auth_secret() -> String {
    std::env::var("COURIER_AUTH_SECRET")
        .unwrap_or_else(|_| "courier-development-secret".to_string())
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_credential_sources() -> Vec<CredentialSource> {
    courier_auth::extract::DEFAULT_SOURCES.to_vec()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_heartbeat_interval() -> u32 {
    30_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_cors_origin() -> Option<String> {
    std::env::var("COURIER_CORS_ORIGIN").ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            realtime: RealtimeConfig::default(),
            metrics: MetricsConfig::default(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
            token_ttl_secs: default_token_ttl(),
            sources: default_credential_sources(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            heartbeat_interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "courier.toml",
            "/etc/courier/courier.toml",
            "~/.config/courier/courier.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8747);
        assert_eq!(config.realtime.websocket_path, "/ws");
        assert_eq!(config.auth.sources.len(), 3);
        assert_eq!(config.auth.sources[0], CredentialSource::AuthParam);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr();
        assert_eq!(addr.port(), 8747);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [auth]
            secret = "not-for-production"
            sources = ["bearer_header", "cookie"]

            [database]
            url = "sqlite://dm.db"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database.url, "sqlite://dm.db");
        assert_eq!(
            config.auth.sources,
            vec![CredentialSource::BearerHeader, CredentialSource::Cookie]
        );
    }
}
