//! Decoding of client frames and bus payloads into the shapes the session
//! acts on.
//!
//! These functions have no side effects and know nothing about sockets, so
//! the session and the tests can call them directly.
//!
//! # Decision table
//!
//! ```text
//! client text  → not JSON                              → MalformedRequest (warn)
//!              → identityRequest.uuid truthy           → IdentityRequest
//!              → else messageRequest.message truthy    → MessageRequest
//!              → else either key truthy but incomplete → MalformedRequest (warn)
//!              → anything else                         → UnrecognizedRequest (debug)
//!
//! Requests are read by key lookup: sibling keys are ignored and
//! "present" means truthy in the browser's sense (see `is_truthy`).
//!
//! bus payload  → not JSON                         → MalformedPayload (debug)
//!              → {"webrtc": ...}                  → BusPayload::Signaling
//!              → {"sip":{"createContextResponse"}}→ BusPayload::ContextResponse
//!              → anything else                    → BusPayload::Other
//! ```

use serde_json::Value;
use thiserror::Error;

use signal_bus::Envelope;

use crate::application::publisher::BusError;
use crate::domain::messages::{
    is_truthy, ClientEvent, ClientRequest, CreateContextResponse, MessageEvent,
};

// ── Error type ────────────────────────────────────────────────────────────────

/// Failures while handling one client frame or one bus delivery.
///
/// None of these end the session: the offending input is logged and dropped.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The client sent text that is not JSON, or a recognized request with
    /// unusable fields.
    #[error("malformed client request: {0}")]
    MalformedRequest(String),

    /// The client sent valid JSON that is not a known request.
    #[error("unrecognized client request: {0}")]
    UnrecognizedRequest(String),

    /// A bus delivery could not be decoded.
    #[error("malformed bus payload from '{from}': {reason}")]
    MalformedPayload { from: String, reason: String },

    /// Publishing the resulting envelope failed.
    #[error("bus publish failed: {0}")]
    Bus(#[from] BusError),
}

impl GatewayError {
    /// `true` for input that is merely of an unknown shape rather than broken.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, GatewayError::UnrecognizedRequest(_))
    }
}

// ── Client → Gateway ──────────────────────────────────────────────────────────

/// Parses one client text frame.
///
/// An identity request wins over a message request in the same frame.
///
/// # Errors
///
/// - [`GatewayError::MalformedRequest`] for non-JSON text, an identity
///   request without a truthy `uuid`, or a message request without a
///   truthy `message`.
/// - [`GatewayError::UnrecognizedRequest`] for JSON of any other shape.
pub fn parse_client_request(text: &str) -> Result<ClientRequest, GatewayError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

    let identity = truthy_field(&value, "identityRequest");
    if let Some(uuid) = identity.and_then(|req| truthy_field(req, "uuid")) {
        return Ok(ClientRequest::IdentityRequest { uuid: uuid.clone() });
    }

    let message_request = truthy_field(&value, "messageRequest");
    if let Some(request) = message_request {
        if let Some(message) = truthy_field(request, "message") {
            return Ok(ClientRequest::MessageRequest {
                to: destination(request.get("to")),
                message: message.clone(),
            });
        }
    }

    if identity.is_some() {
        Err(GatewayError::MalformedRequest(
            "identityRequest without a uuid".to_string(),
        ))
    } else if message_request.is_some() {
        Err(GatewayError::MalformedRequest(
            "messageRequest without a message".to_string(),
        ))
    } else {
        Err(GatewayError::UnrecognizedRequest(
            "no identityRequest or messageRequest".to_string(),
        ))
    }
}

/// `value[key]`, if `value` is an object and the field is truthy.
fn truthy_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| is_truthy(v))
}

/// The explicit destination topic of a message request.
///
/// Falsy values mean "no destination".  Numbers are accepted in their text
/// form; other non-string values carry no usable topic.
fn destination(to: Option<&Value>) -> Option<String> {
    match to.filter(|v| is_truthy(v))? {
        Value::String(topic) => Some(topic.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns a short name for a request, for log lines that must not echo
/// payload contents.
pub fn request_type_name(request: &ClientRequest) -> &'static str {
    match request {
        ClientRequest::IdentityRequest { .. } => "identityRequest",
        ClientRequest::MessageRequest { .. } => "messageRequest",
    }
}

// ── Bus → Gateway ─────────────────────────────────────────────────────────────

/// What a bus delivery turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum BusPayload {
    /// A signaling payload to relay to the client untouched.
    Signaling(Value),
    /// A backend reply to one of this session's context requests.
    ContextResponse(CreateContextResponse),
    /// Anything else; ignored.
    Other,
}

/// Classifies the payload of a delivered envelope.
///
/// # Errors
///
/// Returns [`GatewayError::MalformedPayload`] when the payload is not JSON,
/// or is a context response without a usable `uuid`.
pub fn classify_bus_payload(envelope: &Envelope) -> Result<BusPayload, GatewayError> {
    let malformed = |reason: String| GatewayError::MalformedPayload {
        from: envelope.from.clone(),
        reason,
    };

    let value: Value =
        serde_json::from_slice(&envelope.payload).map_err(|e| malformed(e.to_string()))?;

    if value.get("webrtc").is_some_and(|v| !v.is_null()) {
        return Ok(BusPayload::Signaling(value));
    }

    match value.pointer("/sip/createContextResponse") {
        Some(raw) if !raw.is_null() => serde_json::from_value(raw.clone())
            .map(BusPayload::ContextResponse)
            .map_err(|e| malformed(e.to_string())),
        _ => Ok(BusPayload::Other),
    }
}

/// Wraps a signaling payload with the envelope's routing metadata.
pub fn message_event(envelope: &Envelope, message: Value) -> ClientEvent {
    ClientEvent::MessageEvent(MessageEvent {
        to: envelope.to.clone(),
        from: envelope.from.clone(),
        timestamp: envelope.timestamp.clone(),
        message,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
