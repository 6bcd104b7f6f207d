//! Normalization of backend and channel records into [`Message`]s.

use serde::Deserialize;
use serde_json::Value;

use crate::ids::CustomerId;
use crate::timestamp::parse_or_now;
use crate::types::{Message, RawMessage, Sender};

/// Legacy sender inference: a message with a non-blank customer id
/// attached was written by the customer, anything else by an agent.
///
/// Compatibility shim for backend records that predate an explicit
/// sender field. Do not extend it; new payloads should carry `sender`.
pub fn infer_legacy_sender(customer_id: Option<&CustomerId>) -> Sender {
    match customer_id {
        Some(id) if !id.is_blank() => Sender::Customer,
        _ => Sender::Agent,
    }
}

/// Converts a backend message record, applying [`infer_legacy_sender`].
pub fn normalize_legacy_message(raw: RawMessage) -> Message {
    Message {
        sender: infer_legacy_sender(raw.customer_id.as_ref()),
        body: raw.body,
        created_at: parse_or_now(raw.created_at.as_deref()),
        customer_id: raw.customer_id,
    }
}

/// Normalizes the messages embedded in a conversation and orders them by
/// ascending `created_at`. Equal timestamps keep their backend order.
///
/// ```
/// use cws_core::{RawMessage, hydrate_messages};
///
/// let messages = hydrate_messages(vec![
///     RawMessage { body: "second".into(), created_at: Some("2024-01-01T00:00:02Z".into()), ..Default::default() },
///     RawMessage { body: "first".into(), created_at: Some("2024-01-01T00:00:01Z".into()), ..Default::default() },
/// ]);
/// assert_eq!(messages[0].body, "first");
/// ```
pub fn hydrate_messages(raw: Vec<RawMessage>) -> Vec<Message> {
    let mut messages: Vec<Message> = raw.into_iter().map(normalize_legacy_message).collect();
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    messages
}

#[derive(Debug, Deserialize)]
struct InboundPayload {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    customer_id: Option<CustomerId>,
}

/// Decodes an inbound `shout` payload. Payloads that are not objects or
/// carry no `body` yield `None`.
pub fn inbound_message(payload: &Value) -> Option<Message> {
    let inbound = InboundPayload::deserialize(payload).ok()?;
    let body = inbound.body?;
    let sender = inbound
        .sender
        .as_deref()
        .and_then(Sender::parse)
        .unwrap_or_else(|| infer_legacy_sender(inbound.customer_id.as_ref()));

    Some(Message {
        sender,
        body,
        created_at: parse_or_now(inbound.created_at.as_deref()),
        customer_id: inbound.customer_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn raw(body: &str, created_at: &str, customer: Option<&str>) -> RawMessage {
        RawMessage {
            id: None,
            body: body.into(),
            created_at: Some(created_at.into()),
            customer_id: customer.map(CustomerId::from),
        }
    }

    #[test]
    fn sender_follows_customer_id_presence() {
        let from_customer = normalize_legacy_message(raw("hi", "2024-01-01T00:00:00Z", Some("c")));
        let from_agent = normalize_legacy_message(raw("hello", "2024-01-01T00:00:00Z", None));
        assert_eq!(from_customer.sender, Sender::Customer);
        assert_eq!(from_agent.sender, Sender::Agent);
    }

    #[test]
    fn blank_customer_id_counts_as_agent() {
        for blank in ["", "   "] {
            let message = normalize_legacy_message(raw("hi", "2024-01-01T00:00:00Z", Some(blank)));
            assert_eq!(message.sender, Sender::Agent, "customer_id {blank:?}");
        }
        let message = inbound_message(&json!({"body": "hi", "customer_id": ""})).unwrap();
        assert_eq!(message.sender, Sender::Agent);
    }

    #[test]
    fn hydration_sorts_out_of_order_messages() {
        let messages = hydrate_messages(vec![
            raw("later", "2024-01-01T10:00:00Z", Some("cust1")),
            raw("earlier", "2024-01-01T09:00:00", None),
            raw("latest", "2024-01-01T11:00:00.5", Some("cust1")),
        ]);
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["earlier", "later", "latest"]);
        assert_eq!(messages[0].created_at, datetime!(2024-01-01 09:00:00 UTC));
    }

    #[test]
    fn hydration_keeps_backend_order_for_ties() {
        let messages = hydrate_messages(vec![
            raw("a", "2024-01-01T10:00:00Z", None),
            raw("b", "2024-01-01T10:00:00Z", None),
        ]);
        assert_eq!(messages[0].body, "a");
        assert_eq!(messages[1].body, "b");
    }

    #[test]
    fn inbound_prefers_explicit_sender() {
        let message = inbound_message(&json!({
            "body": "hello",
            "sender": "agent",
            "customer_id": "cust1",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(message.sender, Sender::Agent);
        assert_eq!(message.customer_id, Some(CustomerId::from("cust1")));
    }

    #[test]
    fn inbound_without_sender_uses_legacy_rule() {
        let message = inbound_message(&json!({"body": "hi", "customer_id": "cust1"})).unwrap();
        assert_eq!(message.sender, Sender::Customer);

        let message = inbound_message(&json!({"body": "hi", "customer_id": null})).unwrap();
        assert_eq!(message.sender, Sender::Agent);
    }

    #[test]
    fn inbound_without_body_is_dropped() {
        assert!(inbound_message(&json!({"sender": "agent"})).is_none());
        assert!(inbound_message(&json!("just a string")).is_none());
    }
}
