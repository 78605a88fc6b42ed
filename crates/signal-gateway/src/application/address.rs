//! Per-connection bus address allocation.
//!
//! Every WebSocket connection gets two random values:
//!
//! - an **address** (`T-` + 64 hex chars), the topic other clients and the
//!   backend use to reach this client, and
//! - a **session** value (64 hex chars), appended to the address to form the
//!   reply topic `address_session` used as `from` on everything this
//!   connection publishes.
//!
//! Each value is the SHA-256 digest of 256 bits drawn from the thread-local
//! CSPRNG.  With that much entropy two live connections colliding is not a
//! practical concern, so no collision check or retry is performed.

use rand::RngCore;
use sha2::{Digest, Sha256};

use signal_bus::{sub_topic, CLIENT_ADDRESS_PREFIX};

/// The pair of identifiers allocated to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    address: String,
    session: String,
    sub_topic: String,
}

impl SessionIdentity {
    /// Builds an identity from known parts (used by tests and replays).
    pub fn new(address: impl Into<String>, session: impl Into<String>) -> Self {
        let address = address.into();
        let session = session.into();
        let sub_topic = sub_topic(&address, &session);
        Self {
            address,
            session,
            sub_topic,
        }
    }

    /// Stable address of the connection; the bus subscription prefix.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Per-connection session value.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// `address + "_" + session`: the `from` topic for everything published
    /// by this connection, and where one-shot backend replies are sent.
    pub fn sub_topic(&self) -> &str {
        &self.sub_topic
    }
}

/// Allocates a fresh identity for a new connection.
pub fn allocate_identity() -> SessionIdentity {
    let address = format!("{CLIENT_ADDRESS_PREFIX}{}", random_digest());
    SessionIdentity::new(address, random_digest())
}

fn random_digest() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    hex::encode(Sha256::digest(seed))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
