//! Realtime channel abstraction and its Phoenix websocket implementation.
//!
//! A channel is a topic-scoped subscription on a shared connection. The
//! session controller only sees the [`RealtimeChannel`] trait; the
//! connection object behind it is created and owned by the caller.
pub mod backoff;
pub mod frame;
mod loopback;
mod socket;

use std::sync::Arc;

use async_trait::async_trait;
use cws_core::ConversationId;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

pub use frame::PhoenixFrame;
pub use loopback::{LoopbackClient, LoopbackHub, PushRecord};
pub use socket::{ConnectionState, PhoenixSocket, SocketConfig};

/// Chat event name, used in both directions.
pub const SHOUT: &str = "shout";

/// Topic carrying the events of one conversation.
///
/// ```
/// use cws_channel::conversation_topic;
/// use cws_core::ConversationId;
///
/// assert_eq!(conversation_topic(&ConversationId::from("conv1")), "conversation:conv1");
/// ```
pub fn conversation_topic(conversation_id: &ConversationId) -> String {
    format!("conversation:{conversation_id}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

/// Outcome of a join request.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinAck {
    Ok(Value),
    Error(Value),
    Timeout,
}

/// Handle returned by [`RealtimeChannel::subscribe`].
///
/// `events` yields only the event names requested at subscribe time, in
/// arrival order. `ack` resolves once with the first join outcome.
#[derive(Debug)]
pub struct Subscription {
    pub topic: String,
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
    pub ack: oneshot::Receiver<JoinAck>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("realtime connection is closed")]
    Closed,
    #[error("not subscribed to topic {0}")]
    NotJoined(String),
    #[error("too many pushes waiting for topic {0} to join")]
    BufferFull(String),
    #[error("channel does not support leave")]
    LeaveUnsupported,
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("frame encode error")]
    Encode(#[source] serde_json::Error),
}

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Issues a join for `topic` and returns without waiting for the
    /// acknowledgement. Subscribing to a topic that is already subscribed
    /// replaces the previous subscription.
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError>;

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError>;

    /// Leaves `topic`. Implementations without a leave capability keep the
    /// default, which callers treat as a no-op.
    async fn leave(&self, _topic: &str) -> Result<(), ChannelError> {
        Err(ChannelError::LeaveUnsupported)
    }
}

pub type SharedRealtimeChannel = Arc<dyn RealtimeChannel>;
