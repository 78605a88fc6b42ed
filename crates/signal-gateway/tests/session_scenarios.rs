//! Session scenarios against the real in-process hub.
//!
//! A test-side "backend" subscribes to `ZMQ2SIP` on the same hub the session
//! publishes to, and answers by publishing to the envelope's `from` topic,
//! exactly as the SIP backend does over TCP.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};

use signal_bus::{Envelope, BACKEND_TOPIC};
use signal_gateway::application::{allocate_identity, BusPublisher, Session, SessionState};
use signal_gateway::domain::{ClientEvent, IdentityResponse, ResourceHandle};
use signal_gateway::infrastructure::{BusHub, Subscription};

/// A session wired to `hub`, plus its own subscription and a backend tap.
struct Harness {
    hub: Arc<BusHub>,
    session: Session,
    inbox: Subscription,
    backend: Subscription,
}

impl Harness {
    fn new() -> Self {
        let hub = BusHub::new();
        let backend = hub.subscribe(BACKEND_TOPIC);
        let identity = allocate_identity();
        let inbox = hub.subscribe(identity.address());
        let publisher: Arc<dyn BusPublisher> = hub.clone();
        let mut session = Session::new(identity, publisher);
        session.activate();
        Self {
            hub,
            session,
            inbox,
            backend,
        }
    }

    /// Next envelope the backend saw, decoded.
    fn backend_next(&mut self) -> (Envelope, Value) {
        let env = self.backend.try_recv().expect("backend received nothing");
        let payload = serde_json::from_slice(&env.payload).unwrap();
        ((*env).clone(), payload)
    }

    /// Feeds everything queued for this session back into it.
    fn pump(&mut self) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Some(env) = self.inbox.try_recv() {
            if let Ok(Some(event)) = self.session.handle_bus_envelope(&env) {
                out.push(event);
            }
        }
        out
    }

    /// Backend reply to a context request.
    fn reply(&self, to: &str, request_id: &str, success: bool, id: Value) {
        let body = json!({"sip":{"createContextResponse":{
            "uuid": request_id, "success": success, "context": {"id": id}
        }}});
        self.hub
            .publish(Envelope::stamped(to, BACKEND_TOPIC, body.to_string()))
            .unwrap();
    }

    /// Runs a full successful identity exchange and returns the response.
    fn identify(&mut self, uuid: &str, ctx: &str) -> ClientEvent {
        self.session
            .handle_client_text(&json!({"identityRequest":{"uuid":uuid}}).to_string())
            .unwrap();
        let (env, payload) = self.backend_next();
        let rid = payload["sip"]["createContextRequest"]["uuid"]
            .as_str()
            .unwrap()
            .to_string();
        self.reply(&env.from, &rid, true, json!(ctx));
        let mut events = self.pump();
        assert_eq!(events.len(), 1);
        events.remove(0)
    }
}

#[test]
fn test_identity_scenario_yields_single_success_response() {
    // Arrange
    let mut h = Harness::new();
    let address = h.session.identity().address().to_string();
    let session_id = h.session.identity().session().to_string();

    // Act
    let event = h.identify("r1", "ctx-9");

    // Assert
    assert_eq!(
        event,
        ClientEvent::IdentityResponse(IdentityResponse::success(address, session_id, "r1"))
    );
    assert_eq!(h.session.context(), Some(&ResourceHandle::from("ctx-9")));
}

#[test]
fn test_create_request_is_sent_from_sub_topic() {
    let mut h = Harness::new();

    h.session
        .handle_client_text(r#"{"identityRequest":{"uuid":"r1"}}"#)
        .unwrap();

    let (env, payload) = h.backend_next();
    assert_eq!(env.to, BACKEND_TOPIC);
    assert_eq!(env.from, h.session.identity().sub_topic());
    assert!(payload["sip"]["createContextRequest"]["uuid"].is_string());
}

#[test]
fn test_failed_allocation_yields_failure_and_no_handle() {
    let mut h = Harness::new();
    h.session
        .handle_client_text(r#"{"identityRequest":{"uuid":"r2"}}"#)
        .unwrap();
    let (env, payload) = h.backend_next();
    let rid = payload["sip"]["createContextRequest"]["uuid"]
        .as_str()
        .unwrap()
        .to_string();

    h.reply(&env.from, &rid, false, Value::Null);
    let events = h.pump();

    assert_eq!(
        events,
        vec![ClientEvent::IdentityResponse(IdentityResponse::failure("r2"))]
    );
    assert!(h.session.context().is_none());
}

#[test]
fn test_empty_context_id_counts_as_failure() {
    let mut h = Harness::new();
    h.session
        .handle_client_text(r#"{"identityRequest":{"uuid":"r3"}}"#)
        .unwrap();
    let (env, payload) = h.backend_next();
    let rid = payload["sip"]["createContextRequest"]["uuid"]
        .as_str()
        .unwrap()
        .to_string();

    h.reply(&env.from, &rid, true, json!(""));

    assert_eq!(
        h.pump(),
        vec![ClientEvent::IdentityResponse(IdentityResponse::failure("r3"))]
    );
}

#[test]
fn test_offer_before_identity_published_with_null_context() {
    let mut h = Harness::new();

    h.session
        .handle_client_text(r#"{"messageRequest":{"message":{"webrtc":{"sessionOffer":{}}}}}"#)
        .unwrap();

    let (env, payload) = h.backend_next();
    assert_eq!(env.to, BACKEND_TOPIC);
    assert!(payload["webrtc"]["sessionOffer"]["sip"]["context"]["id"].is_null());
}

#[test]
fn test_offer_answer_acknowledge_after_identity_carry_handle() {
    let mut h = Harness::new();
    h.identify("r1", "ctx-9");

    for step in ["sessionOffer", "sessionAnswer", "sessionAcknowledge"] {
        let mut webrtc = serde_json::Map::new();
        webrtc.insert(step.to_string(), json!({}));
        let text = json!({"messageRequest":{"message":{"webrtc": webrtc}}}).to_string();
        h.session.handle_client_text(&text).unwrap();

        let (_, payload) = h.backend_next();
        assert_eq!(payload["webrtc"][step]["sip"]["context"]["id"], "ctx-9");
    }
}

#[test]
fn test_message_to_peer_is_delivered_as_message_event() {
    // Arrange: two sessions on the same hub.
    let mut alice = Harness::new();
    let identity = allocate_identity();
    let mut bob_inbox = alice.hub.subscribe(identity.address());
    let publisher: Arc<dyn BusPublisher> = alice.hub.clone();
    let mut bob = Session::new(identity, publisher);
    bob.activate();

    // Act: alice addresses bob's address directly.
    let text = json!({"messageRequest":{
        "to": bob.identity().address(),
        "message": {"webrtc":{"iceCandidate":{"candidate":"a=1"}}}
    }})
    .to_string();
    alice.session.handle_client_text(&text).unwrap();
    let env = bob_inbox.try_recv().unwrap();
    let event = bob.handle_bus_envelope(&env).unwrap();

    // Assert
    match event {
        Some(ClientEvent::MessageEvent(ev)) => {
            assert_eq!(ev.from, alice.session.identity().sub_topic());
            assert_eq!(ev.message["webrtc"]["iceCandidate"]["candidate"], "a=1");
        }
        other => panic!("expected MessageEvent, got {other:?}"),
    }
    assert!(alice.backend.try_recv().is_none());
}

#[test]
fn test_unknown_reply_id_has_no_client_visible_effect() {
    let mut h = Harness::new();
    let sub_topic = h.session.identity().sub_topic().to_string();

    h.reply(&sub_topic, "not-a-pending-id", true, json!("ctx"));

    assert!(h.pump().is_empty());
    assert!(h.session.context().is_none());
}

#[test]
fn test_close_publishes_one_teardown_iff_handle_held() {
    // With a handle.
    let mut h = Harness::new();
    h.identify("r1", "ctx-9");

    h.session.close();
    h.session.close();

    let (env, payload) = h.backend_next();
    assert_eq!(env.from, h.session.identity().sub_topic());
    assert_eq!(payload["sip"]["destroyContextRequest"]["id"], "ctx-9");
    assert!(h.backend.try_recv().is_none());
    assert_eq!(h.session.state(), SessionState::Closed);

    // Without a handle.
    let mut bare = Harness::new();
    bare.session.close();
    assert!(bare.backend.try_recv().is_none());
}

#[test]
fn test_only_latest_handle_is_released() {
    let mut h = Harness::new();
    h.identify("r1", "ctx-1");
    h.identify("r2", "ctx-2");

    h.session.close();

    let (_, payload) = h.backend_next();
    assert_eq!(payload["sip"]["destroyContextRequest"]["id"], "ctx-2");
    assert!(h.backend.try_recv().is_none());
}

#[test]
fn test_concurrent_identities_are_distinct() {
    let mut addresses = HashSet::new();
    let mut sub_topics = HashSet::new();

    for _ in 0..200 {
        let id = allocate_identity();
        assert!(addresses.insert(id.address().to_string()));
        assert!(sub_topics.insert(id.sub_topic().to_string()));
    }
}
