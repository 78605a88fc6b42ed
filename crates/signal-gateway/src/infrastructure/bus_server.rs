//! TCP endpoints of the message bus.
//!
//! The gateway hosts the bus for the SIP backend and any other external
//! party.  Two listeners are bound:
//!
//! - **Inbound** (`bus_inbound_addr`): publishers connect and write envelope
//!   frames.  Every decoded envelope goes to the [`BusRelay`], which
//!   republishes it on the hub.
//! - **Broadcast** (`bus_broadcast_addr`): subscribers connect, write one or
//!   more subscription frames (topic prefixes), and from then on receive
//!   every matching envelope as a frame.
//!
//! ```text
//!  backend ──frames──▶ inbound ──▶ relay ──▶ BusHub ──▶ broadcast ──frames──▶ backend
//!                                              ▲  │
//!                               sessions ──────┘  └────▶ sessions
//! ```
//!
//! # Streaming
//!
//! TCP may split or coalesce frames.  Readers accumulate bytes and decode in a
//! loop until the codec reports `InsufficientData`, the same way on both
//! listeners.  Any other decode error means the stream is corrupt and the
//! connection is dropped.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use signal_bus::{
    decode_envelope, decode_subscription, encode_envelope, topic_matches, Envelope, ProtocolError,
};

use crate::infrastructure::bus_relay::BusRelay;
use crate::infrastructure::hub::BusHub;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Capacity of the channel between inbound readers and the relay.
const INBOUND_QUEUE: usize = 1024;

/// Size of each individual socket read.
const READ_CHUNK: usize = 4096;

/// The two bound bus listeners.
pub struct BusListeners {
    inbound: TcpListener,
    broadcast: TcpListener,
}

impl BusListeners {
    /// Binds both listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if either address cannot be bound.
    pub async fn bind(inbound_addr: SocketAddr, broadcast_addr: SocketAddr) -> anyhow::Result<Self> {
        let inbound = TcpListener::bind(inbound_addr)
            .await
            .with_context(|| format!("failed to bind bus inbound listener on {inbound_addr}"))?;
        let broadcast = TcpListener::bind(broadcast_addr).await.with_context(|| {
            format!("failed to bind bus broadcast listener on {broadcast_addr}")
        })?;
        Ok(Self { inbound, broadcast })
    }

    /// Actual inbound address (useful when bound to port 0).
    pub fn inbound_addr(&self) -> std::io::Result<SocketAddr> {
        self.inbound.local_addr()
    }

    /// Actual broadcast address (useful when bound to port 0).
    pub fn broadcast_addr(&self) -> std::io::Result<SocketAddr> {
        self.broadcast.local_addr()
    }

    /// Accepts publishers and subscribers until `running` is cleared.
    ///
    /// Subscriber connections outlive the accept loop and end when the hub is
    /// closed, so envelopes published during shutdown still reach them.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and the loop goes on.
    pub async fn serve(self, hub: Arc<BusHub>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!(
            "message bus listening: inbound {}, broadcast {}",
            describe(self.inbound_addr()),
            describe(self.broadcast_addr())
        );

        let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(INBOUND_QUEUE);
        let relay_task = tokio::spawn(BusRelay::new(Arc::clone(&hub)).run(inbound_rx));

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping bus listeners");
                break;
            }
            if relay_task.is_finished() {
                warn!("bus relay ended; stopping bus listeners");
                break;
            }

            let accepted = timeout(ACCEPT_POLL, async {
                tokio::select! {
                    res = self.inbound.accept() => (Side::Inbound, res),
                    res = self.broadcast.accept() => (Side::Broadcast, res),
                }
            })
            .await;

            match accepted {
                Ok((Side::Inbound, Ok((stream, peer)))) => {
                    info!("bus publisher connected from {peer}");
                    let tx = inbound_tx.clone();
                    tokio::spawn(async move {
                        read_inbound_frames(stream, peer, tx).await;
                    });
                }
                Ok((Side::Broadcast, Ok((stream, peer)))) => {
                    info!("bus subscriber connected from {peer}");
                    let hub = Arc::clone(&hub);
                    tokio::spawn(async move {
                        serve_subscriber(stream, peer, hub).await;
                    });
                }
                Ok((side, Err(e))) => error!("bus {side:?} accept error: {e}"),
                Err(_) => {
                    // Timeout; loop back to check the flags.
                }
            }
        }

        relay_task.abort();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Inbound,
    Broadcast,
}

fn describe(addr: std::io::Result<SocketAddr>) -> String {
    addr.map_or_else(|e| format!("<unknown: {e}>"), |a| a.to_string())
}

// ── Inbound publishers ────────────────────────────────────────────────────────

/// Decodes envelope frames from one publisher and hands them to the relay.
///
/// Returns when the publisher disconnects, sends a corrupt frame, or the
/// relay has gone away.
pub async fn read_inbound_frames(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<Envelope>,
) {
    let mut recv_buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut read_tmp = vec![0u8; READ_CHUNK];

    loop {
        let n = match stream.read(&mut read_tmp).await {
            Ok(0) => {
                debug!("bus publisher {peer} disconnected");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("bus publisher {peer}: read failed: {e}");
                return;
            }
        };
        recv_buf.extend_from_slice(&read_tmp[..n]);

        loop {
            match decode_envelope(&recv_buf) {
                Ok((envelope, consumed)) => {
                    recv_buf.drain(..consumed);
                    if tx.send(envelope).await.is_err() {
                        debug!("bus publisher {peer}: relay gone; closing");
                        return;
                    }
                }
                Err(ProtocolError::InsufficientData { .. }) => break,
                Err(e) => {
                    warn!("bus publisher {peer}: corrupt frame: {e}");
                    return;
                }
            }
        }
    }
}

// ── Broadcast subscribers ─────────────────────────────────────────────────────

/// Streams matching envelopes to one external subscriber.
///
/// The connection holds a single catch-all hub subscription and filters
/// locally on the prefixes the peer has sent, so a peer may add prefixes at
/// any time.  Nothing is delivered until the first prefix arrives.
pub async fn serve_subscriber(stream: TcpStream, peer: SocketAddr, hub: Arc<BusHub>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut subscription = hub.subscribe("");
    let mut prefixes: Vec<String> = Vec::new();

    let mut recv_buf: Vec<u8> = Vec::new();
    let mut read_tmp = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            read = read_half.read(&mut read_tmp) => {
                let n = match read {
                    Ok(0) => {
                        debug!("bus subscriber {peer} disconnected");
                        return;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("bus subscriber {peer}: read failed: {e}");
                        return;
                    }
                };
                recv_buf.extend_from_slice(&read_tmp[..n]);

                loop {
                    match decode_subscription(&recv_buf) {
                        Ok((prefix, consumed)) => {
                            recv_buf.drain(..consumed);
                            debug!("bus subscriber {peer}: subscribed to '{prefix}'");
                            if !prefixes.contains(&prefix) {
                                prefixes.push(prefix);
                            }
                        }
                        Err(ProtocolError::InsufficientData { .. }) => break,
                        Err(e) => {
                            warn!("bus subscriber {peer}: corrupt subscription frame: {e}");
                            return;
                        }
                    }
                }
            }

            delivery = subscription.recv() => {
                let Some(envelope) = delivery else {
                    debug!("bus subscriber {peer}: hub closed");
                    return;
                };
                if !prefixes.iter().any(|p| topic_matches(p, &envelope.to)) {
                    continue;
                }
                let frame = match encode_envelope(&envelope) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("bus subscriber {peer}: cannot frame envelope to {}: {e}", envelope.to);
                        continue;
                    }
                };
                if let Err(e) = write_half.write_all(&frame).await {
                    debug!("bus subscriber {peer}: write failed: {e}");
                    return;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
