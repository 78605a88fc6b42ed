//! signal-gateway library crate.
//!
//! This crate provides a WebSocket-to-message-bus gateway for browser-based
//! WebRTC clients that place calls through a SIP backend.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON over WebSocket)
//!         ↕
//! [signal-gateway]
//!   ├── domain/           Pure types: client/bus JSON messages, GatewayConfig
//!   ├── application/      Session state machine, correlation, enrichment
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── hub/        In-process topic-prefix pub/sub
//!         └── bus_server/ TCP inbound + broadcast listeners (signal-bus codec)
//!         ↕
//! SIP backend (envelopes on topic ZMQ2SIP)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async and no framework types.
//! - `application` depends on `domain` and `signal-bus` only; it publishes
//!   through the [`application::BusPublisher`] trait.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.
//!
//! # Testing
//!
//! Everything interesting about a connection (which backend request is
//! waiting, whether a SIP context is held, how outgoing messages are
//! rewritten) lives in the application layer and can be unit-tested without
//! a socket.  The infrastructure layer just moves bytes and timers.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: per-connection session logic.
pub mod application;

/// Infrastructure layer: WebSocket server, message bus, configuration file.
pub mod infrastructure;
