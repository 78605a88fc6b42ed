//! Domain layer for signal-gateway.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes.
//!
//! # What belongs in the domain layer?
//!
//! - Message types (the JSON "language" between browser, gateway and backend)
//! - Configuration structures
//! - The opaque resource handle the backend allocates for a session
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;
pub mod messages;

pub use config::{parse_bus_endpoint, EndpointError, GatewayConfig};
pub use messages::{
    is_truthy, ClientEvent, ClientRequest, ContextRef, CreateContextResponse, IdentityResponse,
    MessageEvent, ResourceHandle, SipEnvelope, SipMessage, KEEPALIVE_PAYLOAD,
};
