//! Infrastructure layer for signal-gateway.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from clients and hosting the message bus.
//!
//! # Responsibilities
//!
//! - Binding the WebSocket listener and performing the upgrade handshake
//! - Running one event loop per client connection
//! - The in-process publish/subscribe hub shared by all sessions
//! - Binding the bus's inbound and broadcast TCP listeners and relaying
//!   between them
//! - Reading the optional TOML configuration file
//! - Handling the graceful shutdown sequence
//!
//! # What does NOT belong here?
//!
//! - Session state and request correlation (that is the application layer)
//! - Message type definitions (that is the domain layer)

pub mod bus_relay;
pub mod bus_server;
pub mod config_file;
pub mod gateway;
pub mod hub;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use bus_relay::BusRelay;
pub use bus_server::BusListeners;
pub use config_file::{ConfigError, ConfigFile};
pub use gateway::{run_gateway, SHUTDOWN_GRACE};
pub use hub::{BusHub, Subscription, SUBSCRIBER_QUEUE_CAPACITY};
pub use ws_server::{run_server, serve_clients};
