use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::ids::{AccountId, ConversationId, CustomerId};

/// Author side of a chat message.
///
/// ```
/// use cws_core::Sender;
///
/// assert_eq!(serde_json::to_string(&Sender::Agent).unwrap(), "\"agent\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Customer,
    Agent,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Customer => "customer",
            Sender::Agent => "agent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Sender::Customer),
            "agent" => Some(Sender::Agent),
            _ => None,
        }
    }
}

/// Chat message as held in the session's ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub body: String,
    #[serde(default = "crate::timestamp::now", with = "crate::timestamp::lenient")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
}

/// Message record as embedded in a backend conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<RawMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<ConversationId>) -> Self {
        Self {
            id: id.into(),
            account_id: None,
            customer_id: None,
            status: None,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
}

/// Payload of the outbound `shout` event published when the customer
/// submits a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundShout {
    pub body: String,
    pub sender: Sender,
    pub conversation_id: ConversationId,
    pub account_id: AccountId,
    pub customer_id: CustomerId,
}

impl OutboundShout {
    pub fn from_customer(
        body: impl Into<String>,
        conversation_id: ConversationId,
        account_id: AccountId,
        customer_id: CustomerId,
    ) -> Self {
        Self {
            body: body.into(),
            sender: Sender::Customer,
            conversation_id,
            account_id,
            customer_id,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
