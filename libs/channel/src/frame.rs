//! Phoenix channel frames, serializer version 2.0.0.
//!
//! Every frame is a JSON array `[join_ref, ref, topic, event, payload]`.

use serde_json::Value;

use crate::ChannelError;

pub const VSN: &str = "2.0.0";
pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const HEARTBEAT_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, PartialEq)]
pub struct PhoenixFrame {
    pub join_ref: Option<String>,
    pub reference: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl PhoenixFrame {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            join_ref: None,
            reference: None,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    pub fn with_refs(mut self, join_ref: Option<String>, reference: Option<String>) -> Self {
        self.join_ref = join_ref;
        self.reference = reference;
        self
    }

    pub fn encode(&self) -> Result<String, ChannelError> {
        serde_json::to_string(&(
            &self.join_ref,
            &self.reference,
            &self.topic,
            &self.event,
            &self.payload,
        ))
        .map_err(ChannelError::Encode)
    }

    /// Parses a text frame. Anything that is not a five-element array with
    /// string topic and event yields `None`.
    pub fn decode(raw: &str) -> Option<Self> {
        let (join_ref, reference, topic, event, payload): (
            Option<String>,
            Option<String>,
            String,
            String,
            Value,
        ) = serde_json::from_str(raw).ok()?;
        Some(Self {
            join_ref,
            reference,
            topic,
            event,
            payload,
        })
    }

    /// Splits a `phx_reply` payload into its status and response.
    pub fn reply(&self) -> (&str, Value) {
        let status = self
            .payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("error");
        let response = self.payload.get("response").cloned().unwrap_or(Value::Null);
        (status, response)
    }
}
