//! Wiring of the whole gateway process: bus, WebSocket server, shutdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::config::GatewayConfig;
use crate::infrastructure::bus_server::BusListeners;
use crate::infrastructure::hub::BusHub;
use crate::infrastructure::ws_server::run_server;

/// Time given to closing sessions to get their teardown requests onto the
/// bus before the hub is shut down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Runs the bus and the WebSocket server until `running` is cleared.
///
/// Shutdown order: stop accepting (bus and WebSocket), let live sessions
/// close and publish their teardowns, wait [`SHUTDOWN_GRACE`], close the hub.
///
/// # Errors
///
/// Returns an error if any listener cannot be bound.
pub async fn run_gateway(config: GatewayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let hub = BusHub::new();

    let listeners = BusListeners::bind(config.bus_inbound_addr, config.bus_broadcast_addr).await?;
    let bus_task = tokio::spawn(listeners.serve(Arc::clone(&hub), Arc::clone(&running)));

    let result = run_server(config, Arc::clone(&hub), Arc::clone(&running)).await;

    // If the WebSocket side failed to start, take the bus down with it.
    running.store(false, Ordering::Relaxed);

    info!("waiting {SHUTDOWN_GRACE:?} for sessions to close");
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    hub.close();

    match bus_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("message bus stopped with error: {e:#}"),
        Err(e) => warn!("message bus task failed: {e}"),
    }

    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Instant;

    fn loopback_config() -> GatewayConfig {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        GatewayConfig {
            ws_bind_addr: any,
            bus_inbound_addr: any,
            bus_broadcast_addr: any,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cleared_flag_stops_after_grace_period() {
        // Arrange
        let running = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        // Act
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_gateway(loopback_config(), running),
        )
        .await;

        // Assert
        assert!(result.unwrap().is_ok());
        assert!(started.elapsed() >= SHUTDOWN_GRACE);
    }

    #[tokio::test]
    async fn test_bus_bind_failure_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = GatewayConfig {
            bus_inbound_addr: taken.local_addr().unwrap(),
            ..loopback_config()
        };

        let result = run_gateway(config, Arc::new(AtomicBool::new(true))).await;

        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("bus inbound listener"));
    }
}
