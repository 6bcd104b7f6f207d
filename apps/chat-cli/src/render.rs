use cws_core::{MessageRow, message_rows};
use cws_session::SessionSnapshot;
use time::macros::format_description;

/// Formats the rows of `snapshot` starting at message index `from`.
pub fn pending_lines(snapshot: &SessionSnapshot, from: usize) -> Vec<String> {
    message_rows(&snapshot.messages, snapshot.customer_id.as_ref())
        .iter()
        .skip(from)
        .map(format_row)
        .collect()
}

pub fn format_row(row: &MessageRow<'_>) -> String {
    let prefix = if row.is_me { "> " } else { "  " };
    let mut line = format!("{prefix}{}", row.message.body);
    if row.show_timestamp {
        let clock = format_description!("[hour]:[minute]");
        if let Ok(stamp) = row.message.created_at.format(clock) {
            line.push_str(&format!("  [{stamp}]"));
        }
    }
    line
}
