//! Per-connection session state machine.
//!
//! A [`Session`] is everything the gateway knows about one client
//! connection: its bus identity, the SIP context allocated for it (if any),
//! and the backend requests still waiting for a reply.
//!
//! # Lifecycle
//!
//! ```text
//! CONNECTING ──activate()──▶ ACTIVE ──close()──▶ CLOSED
//! ```
//!
//! The session does no I/O of its own.  The infrastructure layer feeds it
//! client frames and bus deliveries one at a time and sends whatever
//! [`ClientEvent`] it returns back to the client; publishing goes through
//! the injected [`BusPublisher`].  Because every handler takes `&mut self`
//! and runs to completion, events for one session are processed strictly in
//! the order the connection task receives them.
//!
//! # Known gap
//!
//! A context request the backend never answers stays pending until the
//! connection closes, and the client never gets an `identityResponse` for
//! it.  There is no allocation timeout.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use signal_bus::{Envelope, BACKEND_TOPIC};

use crate::application::address::SessionIdentity;
use crate::application::correlation::CorrelationTable;
use crate::application::enrichment::enrich_message;
use crate::application::publisher::BusPublisher;
use crate::application::routing::{
    classify_bus_payload, message_event, parse_client_request, request_type_name, BusPayload,
    GatewayError,
};
use crate::domain::messages::{
    ClientEvent, ClientRequest, CreateContextResponse, IdentityResponse, ResourceHandle,
    SipEnvelope, SipMessage,
};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Identity allocated, not yet accepting input.
    Connecting,
    /// Subscribed and accepting client and bus input.
    Active,
    /// Torn down; all input is ignored.
    Closed,
}

/// What to do when a backend reply arrives for a parked request.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    /// A context allocation made on behalf of a client identity request.
    Identity {
        /// The client's own correlation id, echoed in the response.
        client_uuid: Value,
    },
}

/// State of one client connection.
pub struct Session {
    identity: SessionIdentity,
    state: SessionState,
    context: Option<ResourceHandle>,
    correlations: CorrelationTable<PendingRequest>,
    publisher: Arc<dyn BusPublisher>,
}

impl Session {
    /// Creates a session in the `Connecting` state.
    pub fn new(identity: SessionIdentity, publisher: Arc<dyn BusPublisher>) -> Self {
        Self {
            identity,
            state: SessionState::Connecting,
            context: None,
            correlations: CorrelationTable::new(),
            publisher,
        }
    }

    /// Moves a `Connecting` session to `Active`.  No effect in other states.
    pub fn activate(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Active;
            info!("session {}: active", self.identity.address());
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// The SIP context currently held, if allocation succeeded.
    pub fn context(&self) -> Option<&ResourceHandle> {
        self.context.as_ref()
    }

    /// Number of backend requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.correlations.len()
    }

    // ── Client input ──────────────────────────────────────────────────────────

    /// Handles one text frame from the client.
    ///
    /// Returns an event to send back immediately, if any.  Identity requests
    /// normally answer later, from [`Session::handle_bus_envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] for malformed or unrecognized input and for
    /// failed message publishes.  The session stays usable either way.
    pub fn handle_client_text(&mut self, text: &str) -> Result<Option<ClientEvent>, GatewayError> {
        if self.state != SessionState::Active {
            return Ok(None);
        }
        let request = parse_client_request(text)?;
        self.handle_client_request(request)
    }

    /// Handles an already-decoded client request.
    ///
    /// # Errors
    ///
    /// See [`Session::handle_client_text`].
    pub fn handle_client_request(
        &mut self,
        request: ClientRequest,
    ) -> Result<Option<ClientEvent>, GatewayError> {
        if self.state != SessionState::Active {
            return Ok(None);
        }
        debug!(
            "session {}: client → gateway: {}",
            self.identity.address(),
            request_type_name(&request)
        );
        match request {
            ClientRequest::IdentityRequest { uuid } => Ok(self.request_identity(uuid)),
            ClientRequest::MessageRequest { to, message } => {
                self.publish_message(to, message)?;
                Ok(None)
            }
        }
    }

    /// Parks the client's request and asks the backend for a context.
    ///
    /// If the request cannot even be published, the client is answered with
    /// a failure right away.
    fn request_identity(&mut self, client_uuid: Value) -> Option<ClientEvent> {
        let request_id = Uuid::new_v4().to_string();
        let pending = PendingRequest::Identity { client_uuid };
        if let Err(e) = self.correlations.register(request_id.clone(), pending.clone()) {
            warn!("session {}: {e}", self.identity.address());
            return Some(self.complete(pending, None));
        }

        let payload = SipEnvelope {
            sip: SipMessage::CreateContextRequest {
                uuid: request_id.clone(),
            },
        }
        .to_payload();
        let envelope = Envelope::stamped(BACKEND_TOPIC, self.identity.sub_topic(), payload);

        match self.publisher.publish(envelope) {
            Ok(()) => {
                debug!(
                    "session {}: context requested (request {request_id})",
                    self.identity.address()
                );
                None
            }
            Err(e) => {
                warn!(
                    "session {}: context request not sent: {e}",
                    self.identity.address()
                );
                self.correlations
                    .take(&request_id)
                    .map(|pending| self.complete(pending, None))
            }
        }
    }

    /// Enriches and publishes a client message.
    fn publish_message(&mut self, to: Option<String>, message: Value) -> Result<(), GatewayError> {
        let to = to
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| BACKEND_TOPIC.to_string());
        let message = enrich_message(message, self.context.as_ref());
        let payload = serde_json::to_vec(&message)
            .map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

        debug!("session {}: publish to {to}", self.identity.address());
        self.publisher
            .publish(Envelope::stamped(to, self.identity.sub_topic(), payload))?;
        Ok(())
    }

    // ── Bus input ─────────────────────────────────────────────────────────────

    /// Handles one envelope delivered on this session's subscription.
    ///
    /// Signaling payloads are relayed to the client; context replies complete
    /// the matching parked request.  Replies nobody is waiting for (stale,
    /// duplicate, or for another session sharing the address prefix) are
    /// dropped without a trace on the client side.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MalformedPayload`] for undecodable payloads.
    pub fn handle_bus_envelope(
        &mut self,
        envelope: &Envelope,
    ) -> Result<Option<ClientEvent>, GatewayError> {
        if self.state != SessionState::Active {
            return Ok(None);
        }

        match classify_bus_payload(envelope)? {
            BusPayload::Signaling(message) => Ok(Some(message_event(envelope, message))),
            BusPayload::ContextResponse(response) => match self.correlations.take(&response.uuid) {
                Some(pending) => Ok(Some(self.complete(pending, Some(&response)))),
                None => {
                    debug!(
                        "session {}: no pending request {} (ignored)",
                        self.identity.address(),
                        response.uuid
                    );
                    Ok(None)
                }
            },
            BusPayload::Other => Ok(None),
        }
    }

    /// Runs a parked completion with the backend's reply (`None` when the
    /// request never reached the backend).
    fn complete(
        &mut self,
        pending: PendingRequest,
        response: Option<&CreateContextResponse>,
    ) -> ClientEvent {
        match pending {
            PendingRequest::Identity { client_uuid } => {
                match response.and_then(CreateContextResponse::handle) {
                    Some(handle) => {
                        info!(
                            "session {}: SIP context {handle} allocated",
                            self.identity.address()
                        );
                        self.context = Some(handle);
                        ClientEvent::IdentityResponse(IdentityResponse::success(
                            self.identity.address(),
                            self.identity.session(),
                            client_uuid,
                        ))
                    }
                    None => {
                        warn!(
                            "session {}: SIP context allocation failed",
                            self.identity.address()
                        );
                        ClientEvent::IdentityResponse(IdentityResponse::failure(client_uuid))
                    }
                }
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Tears the session down.
    ///
    /// Pending requests are discarded without answering.  If a SIP context is
    /// held, one `destroyContextRequest` is published, fire-and-forget.
    /// Returns `true` if that teardown request was published.
    ///
    /// Calling `close` again is a no-op.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;

        let discarded = self.correlations.discard_all();
        if discarded > 0 {
            debug!(
                "session {}: dropped {discarded} pending request(s)",
                self.identity.address()
            );
        }

        let Some(handle) = self.context.take() else {
            info!("session {}: closed", self.identity.address());
            return false;
        };

        let payload = SipEnvelope {
            sip: SipMessage::DestroyContextRequest {
                id: handle.clone(),
                uuid: Uuid::new_v4().to_string(),
            },
        }
        .to_payload();
        let envelope = Envelope::stamped(BACKEND_TOPIC, self.identity.sub_topic(), payload);

        match self.publisher.publish(envelope) {
            Ok(()) => {
                info!(
                    "session {}: closed, SIP context {handle} released",
                    self.identity.address()
                );
                true
            }
            Err(e) => {
                debug!(
                    "session {}: closed, teardown of {handle} not sent: {e}",
                    self.identity.address()
                );
                false
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("context", &self.context)
            .field("pending", &self.pending_requests())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
