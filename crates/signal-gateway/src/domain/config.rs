//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from defaults, an optional TOML file, and CLI
//! flags (see `main.rs` and `infrastructure::config_file`), then shared
//! read-only with every task.
//!
//! Bus endpoints are written the way ZeroMQ-style deployments write them,
//! `tcp://host:port`, so existing configuration values keep working.  The
//! bare `host:port` form is accepted too.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// All runtime configuration for the gateway.
///
/// # Example
///
/// ```rust
/// use signal_gateway::domain::GatewayConfig;
///
/// let cfg = GatewayConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8888);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Address the client-facing WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Address the bus binds for inbound publishes from external parties.
    ///
    /// Every envelope received here is relayed unmodified to the broadcast
    /// side.
    pub bus_inbound_addr: SocketAddr,

    /// Address the bus binds for external subscribers.
    pub bus_broadcast_addr: SocketAddr,

    /// Interval between the empty `{}` keepalive frames pushed to each client.
    pub keepalive_interval: Duration,

    /// Fallback `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for GatewayConfig {
    /// | Field              | Default            |
    /// |--------------------|--------------------|
    /// | ws_bind_addr       | `0.0.0.0:8888`     |
    /// | bus_inbound_addr   | `127.0.0.1:60508`  |
    /// | bus_broadcast_addr | `127.0.0.1:60507`  |
    /// | keepalive_interval | 10 seconds         |
    /// | log_level          | `info`             |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            bus_inbound_addr: SocketAddr::from(([127, 0, 0, 1], 60508)),
            bus_broadcast_addr: SocketAddr::from(([127, 0, 0, 1], 60507)),
            keepalive_interval: Duration::from_millis(10_000),
            log_level: "info".to_string(),
        }
    }
}

/// A bus endpoint string could not be turned into a socket address.
#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    /// The URI uses a transport other than `tcp://`.
    #[error("unsupported bus endpoint scheme in '{0}' (only tcp:// is supported)")]
    UnsupportedScheme(String),

    /// The host/port part is not a valid socket address.
    #[error("invalid bus endpoint address '{0}'")]
    InvalidAddress(String),
}

/// Parses a bus endpoint such as `tcp://127.0.0.1:60508` or `127.0.0.1:60508`.
///
/// A `*` host (ZeroMQ's "all interfaces") maps to `0.0.0.0`.
///
/// # Errors
///
/// Returns [`EndpointError`] for non-TCP schemes and unparsable addresses.
pub fn parse_bus_endpoint(uri: &str) -> Result<SocketAddr, EndpointError> {
    let uri = uri.trim();
    let rest = match uri.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(EndpointError::UnsupportedScheme(uri.to_string())),
        None => uri,
    };

    let normalized = match rest.strip_prefix("*:") {
        Some(port) => format!("0.0.0.0:{port}"),
        None => rest.to_string(),
    };

    normalized
        .parse()
        .map_err(|_| EndpointError::InvalidAddress(uri.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_port_is_8888() {
        // Arrange / Act
        let cfg = GatewayConfig::default();
        // Assert
        assert_eq!(cfg.ws_bind_addr.port(), 8888);
    }

    #[test]
    fn test_default_bus_endpoints_are_loopback() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.bus_inbound_addr.to_string(), "127.0.0.1:60508");
        assert_eq!(cfg.bus_broadcast_addr.to_string(), "127.0.0.1:60507");
    }

    #[test]
    fn test_default_keepalive_is_10s() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_tcp_uri() {
        let addr = parse_bus_endpoint("tcp://127.0.0.1:60508").unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 60508)));
    }

    #[test]
    fn test_parse_bare_address() {
        let addr = parse_bus_endpoint("10.0.0.5:7000").unwrap();
        assert_eq!(addr.to_string(), "10.0.0.5:7000");
    }

    #[test]
    fn test_parse_wildcard_host_binds_all_interfaces() {
        let addr = parse_bus_endpoint("tcp://*:60507").unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:60507");
    }

    #[test]
    fn test_parse_rejects_ipc_scheme() {
        let result = parse_bus_endpoint("ipc:///tmp/bus");
        assert_eq!(
            result,
            Err(EndpointError::UnsupportedScheme("ipc:///tmp/bus".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert!(matches!(
            parse_bus_endpoint("tcp://127.0.0.1"),
            Err(EndpointError::InvalidAddress(_))
        ));
    }
}
