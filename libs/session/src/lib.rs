//! Session controller for the embeddable chat widget.
//!
//! The controller resolves who the customer is, which conversation is
//! active and which realtime topic to listen on, then relays inbound chat
//! events into an ordered message list. Presentation code reads
//! [`SessionSnapshot`]s and feeds [`InputEvent`]s back.
mod controller;
mod telemetry;

use cws_api::ApiError;
use cws_channel::ChannelError;
use cws_core::{ConversationId, CustomerId, Message};

pub use controller::{SessionController, SessionDeps};

/// Bootstrap phases. `Active` persists until the session is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Uninitialized,
    ResolvingIdentity,
    ResolvingConversation,
    ChannelJoining,
    Active,
}

/// Read-only view of the session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub customer_id: Option<CustomerId>,
    pub conversation_id: Option<ConversationId>,
    pub draft: String,
    pub messages: Vec<Message>,
}

/// One-shot side effects for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    ScrollToLatest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Enter,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    DraftChanged(String),
    KeyDown(Key),
    SubmitClicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    /// Draft was empty after trimming; nothing was published.
    EmptyDraft,
    /// No active conversation channel yet; the draft is kept.
    NotReady,
}

/// How a bootstrap attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// A join was issued for this conversation and the session is active.
    Joined(ConversationId),
    /// A step failed; the failure was logged and the session keeps its
    /// previous state.
    Degraded,
    /// A newer bootstrap started while this one was in flight.
    Superseded,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("conversation api call failed")]
    Api(#[from] ApiError),
    #[error("realtime channel error")]
    Channel(#[from] ChannelError),
    #[error("identity store error")]
    Identity(#[source] anyhow::Error),
    #[error("outbound payload encode error")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Api(_) => "api",
            SessionError::Channel(_) => "channel",
            SessionError::Identity(_) => "identity",
            SessionError::Encode(_) => "encode",
        }
    }
}
