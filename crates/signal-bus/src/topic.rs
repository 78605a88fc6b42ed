//! Topic naming rules shared by the gateway and backend adapters.
//!
//! Two kinds of topic live on the bus:
//!
//! - **Well-known backend topics** such as [`BACKEND_TOPIC`], the fixed name
//!   the SIP backend subscribes to.
//! - **Client addresses**, allocated per WebSocket connection.  They always
//!   start with [`CLIENT_ADDRESS_PREFIX`], which no backend topic uses, so a
//!   dynamically allocated address can never shadow a backend topic.
//!
//! Subscriptions match by plain prefix: a subscriber for `T-abc` receives
//! envelopes sent to `T-abc` and to `T-abc_<session>`.

/// Topic the SIP backend listens on for context allocation and teardown.
pub const BACKEND_TOPIC: &str = "ZMQ2SIP";

/// Prefix of every client-derived address.
pub const CLIENT_ADDRESS_PREFIX: &str = "T-";

/// Separator between an address and its session value in a reply topic.
pub const SUB_TOPIC_SEPARATOR: char = '_';

/// Returns `true` if an envelope addressed to `to` is delivered to a
/// subscriber registered for `prefix`.
///
/// # Examples
///
/// ```rust
/// use signal_bus::topic_matches;
///
/// assert!(topic_matches("T-abc", "T-abc_123"));
/// assert!(topic_matches("", "anything"));
/// assert!(!topic_matches("T-abc", "ZMQ2SIP"));
/// ```
pub fn topic_matches(prefix: &str, to: &str) -> bool {
    to.starts_with(prefix)
}

/// Joins an address and a session value into the per-connection reply topic.
pub fn sub_topic(address: &str, session: &str) -> String {
    format!("{address}{SUB_TOPIC_SEPARATOR}{session}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_topic_joins_with_underscore() {
        assert_eq!(sub_topic("T-aa", "bb"), "T-aa_bb");
    }

    #[test]
    fn test_sub_topic_is_matched_by_its_address() {
        let topic = sub_topic("T-aa", "bb");
        assert!(topic_matches("T-aa", &topic));
    }

    #[test]
    fn test_prefix_match_is_case_sensitive() {
        assert!(!topic_matches("t-aa", "T-aa"));
    }
}
