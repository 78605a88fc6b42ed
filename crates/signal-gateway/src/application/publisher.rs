//! The seam between session logic and the message bus.
//!
//! Sessions only ever *publish*; receiving is done by the infrastructure,
//! which hands delivered envelopes to the session.  Keeping publishing behind
//! a trait lets the session state machine be tested without sockets or
//! tasks.

use signal_bus::Envelope;
use thiserror::Error;

/// Errors returned by a [`BusPublisher`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    /// The bus has been shut down; nothing can be published any more.
    #[error("message bus is closed")]
    Closed,
}

/// Something envelopes can be published to.
///
/// Implementations must not block: publishing is fire-and-forget from the
/// caller's point of view and must be safe to call from many sessions at
/// once.
#[cfg_attr(test, mockall::automock)]
pub trait BusPublisher: Send + Sync {
    /// Delivers `envelope` to every subscriber whose topic prefix matches
    /// `envelope.to`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after the bus has shut down.
    fn publish(&self, envelope: Envelope) -> Result<(), BusError>;
}
