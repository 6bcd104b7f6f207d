//! Stateless display helpers derived from adjacent messages.

use crate::ids::CustomerId;
use crate::types::Message;

/// A message is last in its group when the next message is absent or was
/// written under a different customer id.
pub fn is_last_in_group(messages: &[Message], index: usize) -> bool {
    match (messages.get(index), messages.get(index + 1)) {
        (Some(current), Some(next)) => current.customer_id != next.customer_id,
        _ => true,
    }
}

pub fn is_me(message: &Message, customer_id: Option<&CustomerId>) -> bool {
    match (message.customer_id.as_ref(), customer_id) {
        (Some(author), Some(me)) => author == me,
        _ => false,
    }
}

/// Only the final message shows its timestamp.
pub fn should_display_timestamp(index: usize, len: usize) -> bool {
    len > 0 && index == len - 1
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow<'a> {
    pub message: &'a Message,
    pub is_me: bool,
    pub is_last_in_group: bool,
    pub show_timestamp: bool,
}

pub fn message_rows<'a>(
    messages: &'a [Message],
    customer_id: Option<&CustomerId>,
) -> Vec<MessageRow<'a>> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| MessageRow {
            message,
            is_me: is_me(message, customer_id),
            is_last_in_group: is_last_in_group(messages, index),
            show_timestamp: should_display_timestamp(index, messages.len()),
        })
        .collect()
}
