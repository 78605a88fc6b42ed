//! Injection of the session's SIP context into outgoing signaling payloads.
//!
//! The SIP backend needs to know which context a signaling message belongs
//! to, but browsers never see the context id.  The gateway fills it in on the
//! way out:
//!
//! ```text
//! {"webrtc":{"sessionOffer":{...}}}
//!   → {"webrtc":{"sessionOffer":{..., "sip":{"context":{"id":<handle>}}}}}
//!
//! {"sip":{...}}
//!   → {"sip":{..., "context":<handle>}}
//! ```
//!
//! A top-level `sip` object takes precedence over a signaling step, and only
//! the first signaling step found is enriched.  Presence means truthy in the
//! browser's sense, so a field set to `0` or `""` counts as absent.  Before a
//! context is allocated the same fields are written as `null`.

use serde_json::{Map, Value};

use crate::domain::messages::{is_truthy, ResourceHandle};

/// Signaling steps that carry a nested `sip.context` object, in lookup order.
pub const CONTEXT_CARRYING_VARIANTS: [&str; 3] =
    ["sessionOffer", "sessionAnswer", "sessionAcknowledge"];

/// Returns `message` with the context handle injected where its shape calls
/// for one.  Messages of any other shape are returned unchanged.
///
/// Never fails: without a handle the context fields are set to `null`.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use signal_gateway::application::enrich_message;
/// use signal_gateway::domain::ResourceHandle;
///
/// let handle = ResourceHandle::from("ctx-9");
/// let out = enrich_message(json!({"webrtc":{"sessionOffer":{}}}), Some(&handle));
/// assert_eq!(out, json!({"webrtc":{"sessionOffer":{"sip":{"context":{"id":"ctx-9"}}}}}));
/// ```
pub fn enrich_message(mut message: Value, context: Option<&ResourceHandle>) -> Value {
    let handle = context.map_or(Value::Null, |h| h.as_value().clone());

    if let Some(sip) = message.get_mut("sip").filter(|v| is_truthy(v)) {
        // A truthy non-object `sip` has nowhere to put the context.
        if let Value::Object(sip) = sip {
            sip.insert("context".to_string(), handle);
        }
        return message;
    }

    if let Some(Value::Object(webrtc)) = message.get_mut("webrtc") {
        inject_nested_context(webrtc, &handle);
    }
    message
}

/// Writes `{"id": handle}` into `<step>.sip.context` for the first truthy
/// context-carrying step in `webrtc`.  A step that is truthy but not an
/// object stops the lookup without being changed.
fn inject_nested_context(webrtc: &mut Map<String, Value>, handle: &Value) {
    let Some(name) = CONTEXT_CARRYING_VARIANTS
        .into_iter()
        .find(|name| webrtc.get(*name).is_some_and(is_truthy))
    else {
        return;
    };
    let Some(Value::Object(step)) = webrtc.get_mut(name) else {
        return;
    };

    let sip = step
        .entry("sip")
        .or_insert_with(|| Value::Object(Map::new()));
    if !sip.is_object() {
        *sip = Value::Object(Map::new());
    }
    if let Value::Object(sip) = sip {
        let mut ctx = Map::new();
        ctx.insert("id".to_string(), handle.clone());
        sip.insert("context".to_string(), Value::Object(ctx));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ResourceHandle {
        ResourceHandle::from("ctx-9")
    }

    #[test]
    fn test_offer_gets_nested_context() {
        // Arrange
        let msg = json!({"webrtc":{"sessionOffer":{"sdp":"v=0"}}});

        // Act
        let out = enrich_message(msg, Some(&ctx()));

        // Assert
        assert_eq!(
            out,
            json!({"webrtc":{"sessionOffer":{"sdp":"v=0","sip":{"context":{"id":"ctx-9"}}}}})
        );
    }

    #[test]
    fn test_answer_gets_nested_context() {
        let out = enrich_message(json!({"webrtc":{"sessionAnswer":{}}}), Some(&ctx()));
        assert_eq!(out["webrtc"]["sessionAnswer"]["sip"]["context"]["id"], "ctx-9");
    }

    #[test]
    fn test_acknowledge_gets_nested_context() {
        let out = enrich_message(json!({"webrtc":{"sessionAcknowledge":{}}}), Some(&ctx()));
        assert_eq!(
            out["webrtc"]["sessionAcknowledge"]["sip"]["context"]["id"],
            "ctx-9"
        );
    }

    #[test]
    fn test_existing_sip_fields_are_preserved() {
        let msg = json!({"webrtc":{"sessionOffer":{"sip":{"uri":"sip:bob@example.com"}}}});

        let out = enrich_message(msg, Some(&ctx()));

        assert_eq!(
            out["webrtc"]["sessionOffer"]["sip"],
            json!({"uri":"sip:bob@example.com","context":{"id":"ctx-9"}})
        );
    }

    #[test]
    fn test_stale_context_is_overwritten() {
        let msg = json!({"webrtc":{"sessionAnswer":{"sip":{"context":{"id":"old"}}}}});
        let out = enrich_message(msg, Some(&ctx()));
        assert_eq!(out["webrtc"]["sessionAnswer"]["sip"]["context"]["id"], "ctx-9");
    }

    #[test]
    fn test_without_handle_context_id_is_null() {
        let out = enrich_message(json!({"webrtc":{"sessionOffer":{}}}), None);
        assert_eq!(
            out,
            json!({"webrtc":{"sessionOffer":{"sip":{"context":{"id":null}}}}})
        );
    }

    #[test]
    fn test_only_first_variant_in_lookup_order_is_enriched() {
        let msg = json!({"webrtc":{"sessionAnswer":{},"sessionOffer":{}}});

        let out = enrich_message(msg, Some(&ctx()));

        assert_eq!(out["webrtc"]["sessionOffer"]["sip"]["context"]["id"], "ctx-9");
        assert!(out["webrtc"]["sessionAnswer"].get("sip").is_none());
    }

    #[test]
    fn test_direct_sip_payload_gets_flat_context() {
        let msg = json!({"sip":{"registerRequest":{"user":"alice"}}});

        let out = enrich_message(msg, Some(&ctx()));

        assert_eq!(
            out,
            json!({"sip":{"registerRequest":{"user":"alice"},"context":"ctx-9"}})
        );
    }

    #[test]
    fn test_direct_sip_payload_without_handle_gets_null_context() {
        let out = enrich_message(json!({"sip":{}}), None);
        assert_eq!(out, json!({"sip":{"context":null}}));
    }

    #[test]
    fn test_other_webrtc_variant_is_unchanged() {
        let msg = json!({"webrtc":{"iceCandidate":{"candidate":"a=1"}}});
        assert_eq!(enrich_message(msg.clone(), Some(&ctx())), msg);
    }

    #[test]
    fn test_unrelated_payload_is_unchanged() {
        let msg = json!({"chat":{"text":"hi"}});
        assert_eq!(enrich_message(msg.clone(), Some(&ctx())), msg);
    }

    #[test]
    fn test_non_object_payload_is_unchanged() {
        assert_eq!(enrich_message(json!("text"), Some(&ctx())), json!("text"));
        assert_eq!(enrich_message(json!([1, 2]), None), json!([1, 2]));
    }

    #[test]
    fn test_top_level_sip_wins_over_signaling_step() {
        // Arrange
        let msg = json!({"webrtc":{"sessionOffer":{}},"sip":{}});

        // Act
        let out = enrich_message(msg, Some(&ctx()));

        // Assert: the offer is left untouched.
        assert_eq!(out["sip"]["context"], "ctx-9");
        assert_eq!(out["webrtc"]["sessionOffer"], json!({}));
    }

    #[test]
    fn test_falsy_top_level_sip_falls_back_to_signaling_step() {
        let msg = json!({"webrtc":{"sessionOffer":{}},"sip":0});

        let out = enrich_message(msg, Some(&ctx()));

        assert_eq!(out["sip"], json!(0));
        assert_eq!(out["webrtc"]["sessionOffer"]["sip"]["context"]["id"], "ctx-9");
    }

    #[test]
    fn test_truthy_non_object_sip_is_left_alone() {
        let msg = json!({"webrtc":{"sessionOffer":{}},"sip":"register"});

        let out = enrich_message(msg.clone(), Some(&ctx()));

        assert_eq!(out, msg);
    }

    #[test]
    fn test_falsy_offer_falls_through_to_answer() {
        let msg = json!({"webrtc":{"sessionOffer":0,"sessionAnswer":{}}});

        let out = enrich_message(msg, Some(&ctx()));

        assert_eq!(out["webrtc"]["sessionOffer"], json!(0));
        assert_eq!(out["webrtc"]["sessionAnswer"]["sip"]["context"]["id"], "ctx-9");
    }

    #[test]
    fn test_empty_string_offer_falls_through_to_acknowledge() {
        let msg = json!({"webrtc":{"sessionOffer":"","sessionAcknowledge":{}}});

        let out = enrich_message(msg, Some(&ctx()));

        assert_eq!(
            out["webrtc"]["sessionAcknowledge"]["sip"]["context"]["id"],
            "ctx-9"
        );
    }

    #[test]
    fn test_non_object_sip_inside_offer_is_replaced() {
        let msg = json!({"webrtc":{"sessionOffer":{"sip":"junk"}}});
        let out = enrich_message(msg, Some(&ctx()));
        assert_eq!(
            out["webrtc"]["sessionOffer"]["sip"],
            json!({"context":{"id":"ctx-9"}})
        );
    }
}
