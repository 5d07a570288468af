//! Rendering of chat messages for the terminal.

use chrono::{Local, TimeZone};

use super::types::{ChatHistory, Message};

/// Render `message` with its timestamp converted to local time.
///
/// `[HH:MM] user: text`, or `[HH:MM] text` for system notices.
pub fn render_message(message: &Message) -> String {
    render_message_in(message, &Local)
}

/// Render `message` with its timestamp shown in `tz`.
pub fn render_message_in<Tz>(message: &Message, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let time = message.timestamp.with_timezone(tz).format("%H:%M");
    if message.is_system() {
        format!("[{time}] {}", message.text)
    } else {
        format!("[{time}] {}: {}", message.user, message.text)
    }
}

/// Lines shown for a history response: a header, then one line per message.
pub fn history_lines(history: &ChatHistory) -> Vec<String> {
    if history.messages.is_empty() {
        return vec![format!("No messages yet in {}", history.room)];
    }
    let mut lines = Vec::with_capacity(history.messages.len() + 1);
    lines.push(format!("--- Recent messages in {} ---", history.room));
    lines.extend(history.messages.iter().map(render_message));
    lines
}
