//! Optional TOML configuration file.
//!
//! Deployments that prefer a file over flags can pass `--config path`.  Every
//! field is optional; anything missing falls back to the built-in default, so
//! an empty file is a valid configuration.
//!
//! ```toml
//! log_level = "debug"
//!
//! [message_bus]
//! message_uri      = "tcp://127.0.0.1:60508"
//! subscription_uri = "tcp://127.0.0.1:60507"
//!
//! [web_socket]
//! bind                   = "0.0.0.0"
//! port                   = 8888
//! keep_alive_interval_ms = 10000
//! ```
//!
//! Command-line flags and environment variables are layered on top of the
//! file in `main.rs`: they override a value only when explicitly given.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{parse_bus_endpoint, EndpointError, GatewayConfig};

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A bus URI is not a usable TCP endpoint.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The WebSocket bind host is not an IP address.
    #[error("invalid WebSocket bind address '{0}'")]
    InvalidBindAddress(String),

    /// A zero keepalive interval would spin.
    #[error("keep_alive_interval_ms must be greater than zero")]
    ZeroKeepalive,
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub message_bus: MessageBusSection,
    #[serde(default)]
    pub web_socket: WebSocketSection,
}

/// Bus endpoints, written as `tcp://host:port`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageBusSection {
    /// Where external publishers connect (relayed to subscribers).
    #[serde(default = "default_message_uri")]
    pub message_uri: String,
    /// Where external subscribers connect.
    #[serde(default = "default_subscription_uri")]
    pub subscription_uri: String,
}

/// Client-facing WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSocketSection {
    #[serde(default = "default_ws_bind")]
    pub bind: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_message_uri() -> String {
    "tcp://127.0.0.1:60508".to_string()
}
fn default_subscription_uri() -> String {
    "tcp://127.0.0.1:60507".to_string()
}
fn default_ws_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    8888
}
fn default_keep_alive_ms() -> u64 {
    10_000
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            message_bus: MessageBusSection::default(),
            web_socket: WebSocketSection::default(),
        }
    }
}

impl Default for MessageBusSection {
    fn default() -> Self {
        Self {
            message_uri: default_message_uri(),
            subscription_uri: default_subscription_uri(),
        }
    }
}

impl Default for WebSocketSection {
    fn default() -> Self {
        Self {
            bind: default_ws_bind(),
            port: default_ws_port(),
            keep_alive_interval_ms: default_keep_alive_ms(),
        }
    }
}

// ── Loading and conversion ────────────────────────────────────────────────────

impl ConfigFile {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or mistyped fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Validates the values and builds the runtime [`GatewayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unusable bus URIs, a non-IP bind host, or
    /// a zero keepalive interval.
    pub fn into_gateway_config(self) -> Result<GatewayConfig, ConfigError> {
        let bind_ip: IpAddr = self
            .web_socket
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.web_socket.bind.clone()))?;

        Ok(GatewayConfig {
            ws_bind_addr: SocketAddr::new(bind_ip, self.web_socket.port),
            bus_inbound_addr: parse_bus_endpoint(&self.message_bus.message_uri)?,
            bus_broadcast_addr: parse_bus_endpoint(&self.message_bus.subscription_uri)?,
            keepalive_interval: keepalive_interval(self.web_socket.keep_alive_interval_ms)?,
            log_level: self.log_level,
        })
    }
}

/// Converts a keepalive setting in milliseconds.
///
/// # Errors
///
/// Returns [`ConfigError::ZeroKeepalive`] for `0`.
pub fn keepalive_interval(millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::ZeroKeepalive);
    }
    Ok(Duration::from_millis(millis))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
