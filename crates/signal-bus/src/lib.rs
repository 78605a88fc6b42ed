//! # signal-bus
//!
//! Shared library for the signaling gateway containing the message bus
//! envelope, the topic naming rules, and the binary frame codec used by
//! external publishers and subscribers.
//!
//! This crate has zero dependencies on async runtimes or network sockets, so
//! both the gateway and any backend adapter can reuse it.
//!
//! # Overview
//!
//! The gateway sits between browsers (speaking JSON over WebSocket) and a
//! topic-addressed message bus shared with the SIP/call-control backend.
//! Everything that travels on the bus is an [`Envelope`]: four ordered fields
//! `(to, from, timestamp, payload)`.
//!
//! - **`protocol`** – The envelope type and how it is framed on a TCP stream
//!   (four length-prefixed fields, big-endian lengths).
//!
//! - **`topic`** – Well-known topic names, the client address prefix, and the
//!   prefix-matching rule subscribers use to filter envelopes.

pub mod protocol;
pub mod topic;

// Re-export the most-used items at the crate root so callers can write
// `signal_bus::Envelope` instead of `signal_bus::protocol::envelope::Envelope`.
pub use protocol::codec::{
    decode_envelope, decode_subscription, encode_envelope, encode_subscription, ProtocolError,
};
pub use protocol::envelope::{now_millis, Envelope};
pub use topic::{
    sub_topic, topic_matches, BACKEND_TOPIC, CLIENT_ADDRESS_PREFIX, SUB_TOPIC_SEPARATOR,
};
