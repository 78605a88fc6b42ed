//! Application layer for signal-gateway.
//!
//! The application layer orchestrates the business logic: it knows *what* to
//! do, but delegates *how* to do it to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Allocating a bus address for each connection
//! - Correlating asynchronous backend replies with the requests that caused them
//! - Running the per-connection session state machine
//! - Injecting the SIP context into outgoing signaling messages
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning and timers (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod address;
pub mod correlation;
pub mod enrichment;
pub mod publisher;
pub mod routing;
pub mod session;

// Re-export so callers can write `application::Session` instead of
// `application::session::Session`.
pub use address::{allocate_identity, SessionIdentity};
pub use correlation::{CorrelationError, CorrelationTable};
pub use enrichment::{enrich_message, CONTEXT_CARRYING_VARIANTS};
pub use publisher::{BusError, BusPublisher};
pub use routing::{
    classify_bus_payload, parse_client_request, request_type_name, BusPayload, GatewayError,
};
pub use session::{PendingRequest, Session, SessionState};
