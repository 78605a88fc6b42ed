//! Signal gateway: entry point.
//!
//! This binary accepts WebSocket connections from browser-based WebRTC
//! clients and connects them to a topic-addressed message bus shared with a
//! SIP backend.  It also hosts that bus: backend processes publish to the
//! inbound port and subscribe on the broadcast port.
//!
//! # Usage
//!
//! ```text
//! signal-gateway [OPTIONS]
//!
//! Options:
//!   --config        <PATH>  Optional TOML configuration file
//!   --ws-port       <PORT>  WebSocket listener port [default: 8888]
//!   --ws-bind       <IP>    WebSocket bind address [default: 0.0.0.0]
//!   --bus-inbound   <URI>   Bus inbound (publish) endpoint [default: tcp://127.0.0.1:60508]
//!   --bus-broadcast <URI>   Bus broadcast (subscribe) endpoint [default: tcp://127.0.0.1:60507]
//!   --keepalive-ms  <MS>    Client keepalive interval [default: 10000]
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the TOML file (if given), then environment
//! variables and flags.  A flag or variable only overrides the file when it
//! is actually set.
//!
//! | Variable               | Flag              |
//! |------------------------|-------------------|
//! | `SIGNAL_CONFIG`        | `--config`        |
//! | `SIGNAL_WS_PORT`       | `--ws-port`       |
//! | `SIGNAL_WS_BIND`       | `--ws-bind`       |
//! | `SIGNAL_BUS_INBOUND`   | `--bus-inbound`   |
//! | `SIGNAL_BUS_BROADCAST` | `--bus-broadcast` |
//! | `SIGNAL_KEEPALIVE_MS`  | `--keepalive-ms`  |
//!
//! Log verbosity comes from `RUST_LOG`, falling back to the file's
//! `log_level`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signal_gateway::domain::GatewayConfig;
use signal_gateway::infrastructure::{run_gateway, ConfigFile};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket signaling gateway for WebRTC/SIP clients.
///
/// Every value is optional here so that an unset flag leaves the
/// configuration file's value alone.
#[derive(Debug, Parser)]
#[command(
    name = "signal-gateway",
    about = "WebSocket-to-message-bus gateway for WebRTC/SIP signaling clients",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "SIGNAL_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket server to listen on.
    #[arg(long, env = "SIGNAL_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections on every interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "SIGNAL_WS_BIND")]
    ws_bind: Option<String>,

    /// Endpoint external publishers connect to, e.g. `tcp://127.0.0.1:60508`.
    #[arg(long, env = "SIGNAL_BUS_INBOUND")]
    bus_inbound: Option<String>,

    /// Endpoint external subscribers connect to, e.g. `tcp://127.0.0.1:60507`.
    #[arg(long, env = "SIGNAL_BUS_BROADCAST")]
    bus_broadcast: Option<String>,

    /// Interval between `{}` keepalive frames sent to each client, in
    /// milliseconds.
    #[arg(long, env = "SIGNAL_KEEPALIVE_MS")]
    keepalive_ms: Option<u64>,
}

impl Cli {
    /// Loads the configuration file (if any), applies the flags on top, and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// resulting value is invalid.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let mut file = match &self.config {
            Some(path) => ConfigFile::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ConfigFile::default(),
        };

        if let Some(port) = self.ws_port {
            file.web_socket.port = port;
        }
        if let Some(bind) = self.ws_bind {
            file.web_socket.bind = bind;
        }
        if let Some(uri) = self.bus_inbound {
            file.message_bus.message_uri = uri;
        }
        if let Some(uri) = self.bus_broadcast {
            file.message_bus.subscription_uri = uri;
        }
        if let Some(ms) = self.keepalive_ms {
            file.web_socket.keep_alive_interval_ms = ms;
        }

        file.into_gateway_config()
            .context("invalid gateway configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged with the optional config file.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the
///    configured `log_level`.
/// 3. A signal handler is spawned; it clears a shared `AtomicBool` on
///    Ctrl+C (and SIGTERM on Unix).
/// 4. [`run_gateway`] binds the bus and WebSocket listeners and serves until
///    the flag is cleared, then shuts down gracefully.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_gateway_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "signal gateway starting: ws={}, bus inbound={}, bus broadcast={}",
        config.ws_bind_addr, config.bus_inbound_addr, config.bus_broadcast_addr
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received; initiating graceful shutdown");
        running_clone.store(false, Ordering::Relaxed);
    });

    // ── Main server loop ───────────────────────────────────────────────────────
    run_gateway(config, running).await?;

    info!("signal gateway stopped");
    Ok(())
}

/// Resolves on the first Ctrl+C, or SIGTERM on Unix.
///
/// If a handler cannot be installed the error is logged and that signal is
/// simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
