//! JSON message types for the client protocol and the backend bus payloads.
//!
//! # Message flow
//!
//! ```text
//! Browser → Gateway:  JSON text frame  →  ClientRequest
//! Gateway → Browser:  ClientEvent      →  JSON text frame
//! Gateway ↔ Backend:  SipEnvelope      ↔  envelope payload on the bus
//! ```
//!
//! # JSON discriminant
//!
//! Every message the gateway writes is a JSON object with one key naming the
//! variant, and the variant's fields nested under it.  For example:
//!
//! ```json
//! {"identityResponse":{"success":false,"uuid":"r1"}}
//! {"sip":{"createContextRequest":{"uuid":"r1"}}}
//! ```
//!
//! Serde's default ("externally tagged") enum representation produces exactly
//! this shape; `rename_all = "camelCase"` maps `IdentityResponse` to
//! `identityResponse`.
//!
//! Client requests are read more loosely, by key lookup with
//! [`is_truthy`] checks, so extra keys and non-string ids are tolerated
//! (see `application::routing`).
//!
//! Signaling payloads (`{"webrtc":{...}}`) are deliberately kept as
//! `serde_json::Value`: the gateway relays them between peers and only
//! touches the `sip.context` fields it owns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text pushed to every client on the keepalive interval.
pub const KEEPALIVE_PAYLOAD: &str = "{}";

/// JavaScript-style truthiness, which is how browser clients and the SIP
/// backend decide whether a field is "set".
///
/// `null`, `false`, `0`, `""` are falsy.  Objects and arrays are truthy even
/// when empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ── Client → Gateway ──────────────────────────────────────────────────────────

/// All requests a client can send over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientRequest {
    /// Ask the gateway for a bus identity.
    ///
    /// The gateway first allocates a SIP context on the backend and only then
    /// answers with an [`IdentityResponse`] echoing `uuid`.
    IdentityRequest {
        /// Caller-chosen correlation id (any truthy JSON value), echoed back
        /// unchanged.
        uuid: Value,
    },

    /// Publish `message` on the bus.
    MessageRequest {
        /// Destination topic; the backend topic when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        /// Arbitrary JSON document, usually a `webrtc` or `sip` payload.
        message: Value,
    },
}

// ── Gateway → Client ──────────────────────────────────────────────────────────

/// All messages the gateway pushes to a client (besides the keepalive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    /// Answer to an [`ClientRequest::IdentityRequest`].
    IdentityResponse(IdentityResponse),
    /// A signaling payload delivered to this client's address.
    MessageEvent(MessageEvent),
}

/// Result of an identity request.
///
/// On failure only `uuid` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub uuid: Value,
}

impl IdentityResponse {
    /// Successful identity: the client may now be reached at `address`.
    pub fn success(
        address: impl Into<String>,
        session: impl Into<String>,
        uuid: impl Into<Value>,
    ) -> Self {
        Self {
            success: true,
            address: Some(address.into()),
            session: Some(session.into()),
            uuid: uuid.into(),
        }
    }

    /// Failed identity (the backend refused or returned no context).
    pub fn failure(uuid: impl Into<Value>) -> Self {
        Self {
            success: false,
            address: None,
            session: None,
            uuid: uuid.into(),
        }
    }
}

/// A bus envelope re-wrapped for the client, routing metadata included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub to: String,
    pub from: String,
    pub timestamp: String,
    pub message: Value,
}

// ── Gateway ↔ Backend ─────────────────────────────────────────────────────────

/// Opaque identifier of backend-side state (a SIP context).
///
/// The gateway never interprets it; it stores it, injects it into outgoing
/// signaling payloads, and hands it back on teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(Value);

impl ResourceHandle {
    /// Wraps a backend-supplied id.
    ///
    /// `null`, `false`, `""` and `0` do not name a context and yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        is_truthy(&value).then_some(Self(value))
    }

    /// The handle as it appears in JSON.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for ResourceHandle {
    fn from(id: &str) -> Self {
        Self(Value::String(id.to_string()))
    }
}

/// Top-level wrapper of every SIP backend payload: `{"sip": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipEnvelope {
    pub sip: SipMessage,
}

impl SipEnvelope {
    /// Serializes the payload to bytes ready for an envelope.
    pub fn to_payload(&self) -> Vec<u8> {
        // Serializing derived types without maps keyed by non-strings
        // cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Context-management messages exchanged with the SIP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SipMessage {
    /// Ask the backend to allocate a context; the reply goes to the
    /// envelope's `from` topic.
    CreateContextRequest { uuid: String },

    /// Backend reply to a create request, echoing its `uuid`.
    CreateContextResponse(CreateContextResponse),

    /// Release a context and everything attached to it (calls,
    /// registrations).  Fire-and-forget.
    DestroyContextRequest { id: ResourceHandle, uuid: String },
}

/// Backend reply to [`SipMessage::CreateContextRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateContextResponse {
    pub uuid: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextRef>,
}

impl CreateContextResponse {
    /// The allocated handle, if the reply reports success with a usable id.
    pub fn handle(&self) -> Option<ResourceHandle> {
        if !self.success {
            return None;
        }
        self.context
            .as_ref()
            .and_then(|ctx| ResourceHandle::from_value(ctx.id.clone()))
    }
}

/// `{"id": ...}` object carried in context replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRef {
    #[serde(default)]
    pub id: Value,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
