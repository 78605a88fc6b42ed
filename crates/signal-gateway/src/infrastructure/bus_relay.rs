//! Inbound-to-broadcast relay.
//!
//! External publishers (the SIP backend, other gateways) write envelopes to
//! the inbound listener.  The relay takes each one off the inbound channel and
//! republishes it on the hub exactly as received: same four fields, same
//! order, no filtering.
//!
//! A failed publish means the hub is gone, so the relay stops rather than
//! retrying.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use signal_bus::Envelope;

use crate::application::publisher::BusError;
use crate::infrastructure::hub::BusHub;

/// Republishes inbound envelopes on the hub.
pub struct BusRelay {
    hub: Arc<BusHub>,
    relayed: u64,
}

impl BusRelay {
    pub fn new(hub: Arc<BusHub>) -> Self {
        Self { hub, relayed: 0 }
    }

    /// Republishes one envelope.  Returns the number of subscribers reached.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the hub has been closed.
    pub fn relay(&mut self, envelope: Envelope) -> Result<usize, BusError> {
        debug!("relay: {} → {}", envelope.from, envelope.to);
        let delivered = self.hub.publish(envelope)?;
        self.relayed += 1;
        Ok(delivered)
    }

    /// Total envelopes relayed so far.
    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    /// Relays everything from `inbound` until the channel closes.
    ///
    /// Returns the number of envelopes relayed.
    ///
    /// # Errors
    ///
    /// Returns the first publish failure; the relay does not continue past it.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Envelope>) -> Result<u64, BusError> {
        while let Some(envelope) = inbound.recv().await {
            if let Err(e) = self.relay(envelope) {
                error!("bus relay stopped after {} envelope(s): {e}", self.relayed());
                return Err(e);
            }
        }
        info!("bus relay finished ({} envelope(s))", self.relayed());
        Ok(self.relayed())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
