use cws_core::{AccountId, ConversationId, CustomerId};
use metrics::counter;
use tracing::info_span;

pub fn span_for_session(
    action: &'static str,
    account_id: &AccountId,
    customer_id: Option<&CustomerId>,
    conversation_id: Option<&ConversationId>,
) -> tracing::Span {
    info_span!(
        "widget.session",
        action,
        account_id = account_id.as_str(),
        customer_id = customer_id.map(CustomerId::as_str).unwrap_or("-"),
        conversation_id = conversation_id.map(ConversationId::as_str).unwrap_or("-"),
    )
}

pub fn record_error(kind: &'static str) {
    counter!("widget_session_errors_total", "kind" => kind).increment(1);
}

pub fn record_received() {
    counter!("widget_messages_received_total").increment(1);
}

pub fn record_sent() {
    counter!("widget_messages_sent_total").increment(1);
}
