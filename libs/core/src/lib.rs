//! Chat widget session core contracts and value types.
//!
//! This crate exposes the identifiers, conversation and message records
//! exchanged between the conversation API, the realtime channel and the
//! session controller. It also provides the hydration helpers that turn
//! backend records into the ordered message sequence a widget renders.
pub mod config;
pub mod grouping;
pub mod hydrate;
pub mod ids;
pub mod timestamp;
pub mod types;

pub use config::WidgetConfig;
pub use grouping::{MessageRow, is_last_in_group, is_me, message_rows, should_display_timestamp};
pub use hydrate::{hydrate_messages, inbound_message, normalize_legacy_message};
pub use ids::{AccountId, ConversationId, CustomerId};
pub use types::{Conversation, Customer, Message, OutboundShout, RawMessage, Sender};
