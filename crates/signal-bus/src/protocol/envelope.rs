//! The four-field record carried by the message bus.
//!
//! # Routing
//!
//! The bus does not know anything about SIP or WebRTC.  It only moves
//! envelopes from publishers to subscribers.  The `to` field is the routing
//! key: a subscriber registered for topic prefix `T-abc` receives every
//! envelope whose `to` starts with `T-abc`.  The `from` field tells the
//! receiver where to send a reply, and `payload` is an opaque JSON document.
//!
//! Envelopes are never mutated after creation.  Relays forward them
//! unchanged, field for field.

use std::time::{SystemTime, UNIX_EPOCH};

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Destination topic (routing key).
    pub to: String,
    /// Topic of the sender; replies are addressed here.
    pub from: String,
    /// Milliseconds since the Unix epoch, as decimal text.
    ///
    /// Kept as text because envelopes from external publishers are relayed
    /// verbatim, whatever they put in this field.
    pub timestamp: String,
    /// Serialized payload (a JSON document for every known producer).
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope from its four parts.
    pub fn new(
        to: impl Into<String>,
        from: impl Into<String>,
        timestamp: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            timestamp: timestamp.into(),
            payload: payload.into(),
        }
    }

    /// Builds an envelope stamped with the current wall-clock time.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use signal_bus::Envelope;
    ///
    /// let env = Envelope::stamped("ZMQ2SIP", "T-abc_123", b"{}".to_vec());
    /// assert!(env.timestamp.parse::<u64>().is_ok());
    /// ```
    pub fn stamped(
        to: impl Into<String>,
        from: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(to, from, now_millis().to_string(), payload)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// A clock set before 1970 yields 0 rather than panicking.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
