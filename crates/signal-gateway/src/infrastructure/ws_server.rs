//! WebSocket server: accept loop and per-connection session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from clients.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Allocating a bus address for it and subscribing to that address.
//! 5. Running one event loop per connection that serializes:
//!    - **Client → Bus**: JSON text frames handed to the [`Session`]
//!    - **Bus → Client**: envelopes delivered on the subscription
//!    - **Keepalive**: an empty `{}` frame every `keepalive_interval`
//! 6. Tearing the session down when the client leaves or the server stops.
//!
//! # Why one loop instead of several tasks?
//!
//! All three event sources touch the same session state (the SIP context and
//! the pending backend requests).  Handling them in a single `tokio::select!`
//! loop means each event runs to completion before the next one starts, so
//! the session needs no locking at all.
//!
//! # Shutdown
//!
//! When the `running` flag is cleared the accept loop stops and signals every
//! live connection through a `watch` channel.  Each connection then closes
//! its session, which releases its SIP context on the bus.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::{allocate_identity, BusPublisher, GatewayError, Session};
use crate::domain::config::GatewayConfig;
use crate::domain::messages::{ClientEvent, KEEPALIVE_PAYLOAD};
use crate::infrastructure::hub::BusHub;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: GatewayConfig,
    hub: Arc<BusHub>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!("WebSocket gateway listening on {}", config.ws_bind_addr);

    serve_clients(listener, Arc::new(config), hub, running).await
}

/// Accepts clients on an already-bound listener until `running` is cleared.
///
/// Split out from [`run_server`] so tests can bind port 0 and learn the real
/// address first.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and the loop goes on.
pub async fn serve_clients(
    listener: TcpListener,
    config: Arc<GatewayConfig>,
    hub: Arc<BusHub>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    // Flipped to `true` once the accept loop stops; every connection watches it.
    let (stop_tx, stop_rx) = watch::channel(false);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new client connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let hub = Arc::clone(&hub);
                let stop = stop_rx.clone();
                tokio::spawn(async move {
                    handle_client_session(stream, peer_addr, cfg, hub, stop).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout; loop back to check the `running` flag.
            }
        }
    }

    // No receiver left just means no connection is open.
    let _ = stop_tx.send(true);
    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_client_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<GatewayConfig>,
    hub: Arc<BusHub>,
    stop: watch::Receiver<bool>,
) {
    match run_session(raw_stream, peer_addr, config, hub, stop).await {
        Ok(()) => info!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one client connection.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.  Everything after the
/// handshake is logged and ends the connection normally.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<GatewayConfig>,
    hub: Arc<BusHub>,
    mut stop: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    // ── Step 1: Complete the WebSocket handshake ───────────────────────────────
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    // ── Step 2: Identity and subscription ─────────────────────────────────────
    //
    // The subscription is opened before the session goes active so that no
    // reply to an early identity request can slip past.
    let identity = allocate_identity();
    let mut subscription = hub.subscribe(identity.address());
    let publisher: Arc<dyn BusPublisher> = hub;
    let mut session = Session::new(identity, publisher);
    session.activate();

    let address = session.identity().address().to_string();
    info!("connection {peer_addr}: assigned address {address}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Step 3: Keepalive timer ───────────────────────────────────────────────
    let mut keepalive = interval(config.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the first keepalive is due one
    // interval after connect.
    keepalive.tick().await;

    // ── Step 4: Event loop ────────────────────────────────────────────────────
    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                        debug!("session {address}: WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("session {address}: WebSocket error: {e}");
                        break;
                    }
                    None => {
                        debug!("session {address}: client stream ended");
                        break;
                    }
                };

                match msg {
                    WsMessage::Text(text) => {
                        let outcome = session.handle_client_text(&text);
                        if let Some(event) = log_outcome(&address, outcome) {
                            if send_event(&mut ws_tx, &event).await.is_err() {
                                debug!("session {address}: send failed (client disconnected)");
                                break;
                            }
                        }
                    }
                    WsMessage::Binary(_) => {
                        warn!("session {address}: unexpected binary frame (ignored)");
                    }
                    WsMessage::Ping(data) => {
                        debug!("session {address}: WebSocket ping ({} bytes)", data.len());
                    }
                    WsMessage::Pong(_) => {
                        debug!("session {address}: WebSocket pong received");
                    }
                    WsMessage::Close(_) => {
                        debug!("session {address}: Close frame received");
                        break;
                    }
                    WsMessage::Frame(_) => {
                        debug!("session {address}: raw frame (ignored)");
                    }
                }
            }

            delivery = subscription.recv() => {
                let Some(envelope) = delivery else {
                    info!("session {address}: message bus closed");
                    break;
                };
                let outcome = session.handle_bus_envelope(&envelope);
                if let Some(event) = log_outcome(&address, outcome) {
                    if send_event(&mut ws_tx, &event).await.is_err() {
                        debug!("session {address}: send failed (client disconnected)");
                        break;
                    }
                }
            }

            _ = keepalive.tick() => {
                // A dead client shows up on the read side; nothing to do here.
                if let Err(e) = ws_tx.send(WsMessage::Text(KEEPALIVE_PAYLOAD.to_string())).await {
                    debug!("session {address}: keepalive not sent: {e}");
                }
            }

            _ = stop.changed() => {
                info!("session {address}: server shutting down");
                break;
            }
        }
    }

    // ── Step 5: Teardown ──────────────────────────────────────────────────────
    session.close();
    drop(subscription);
    if let Err(e) = ws_tx.close().await {
        debug!("session {address}: close handshake failed: {e}");
    }

    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Logs a failed handler call at the level its kind deserves and returns the
/// event to send, if any.
fn log_outcome(
    address: &str,
    outcome: Result<Option<ClientEvent>, GatewayError>,
) -> Option<ClientEvent> {
    match outcome {
        Ok(event) => event,
        Err(e) if e.is_unrecognized() => {
            debug!("session {address}: {e} (ignored)");
            None
        }
        Err(e @ GatewayError::MalformedPayload { .. }) => {
            debug!("session {address}: {e} (ignored)");
            None
        }
        Err(e) => {
            warn!("session {address}: {e}");
            None
        }
    }
}

/// Serializes `event` and sends it as one text frame.
async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<(), WsError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(json) => sink.send(WsMessage::Text(json)).await,
        Err(e) => {
            error!("failed to serialize client event: {e}");
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
