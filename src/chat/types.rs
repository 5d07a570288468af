//! Chat wire types.
//!
//! JSON envelopes exchanged with the chat server over the WebSocket, plus
//! the history document returned by the HTTP history endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::GENERAL_ROOM;

/// Chat message received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// When the server accepted the message.
    pub timestamp: DateTime<Utc>,
    /// Author username (empty for some system notices).
    #[serde(default)]
    pub user: String,
    /// Message body.
    pub text: String,
    /// Manga room the message belongs to; `None` for general chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Message kind; `"system"` marks server notices.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Recipient of a private message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Message {
    /// Whether this is a server notice rather than user chat.
    pub fn is_system(&self) -> bool {
        self.kind.as_deref() == Some("system")
    }
}

/// What an outgoing envelope asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Broadcast a chat message to the room.
    Message,
    /// List users in the room.
    Users,
    /// Private message to one user.
    Pm,
    /// Connection / room status.
    Status,
}

/// Envelope sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Requested action.
    pub action: Action,
    /// Message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Target room for room messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Recipient of a private message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Manga the request is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manga_id: Option<String>,
}

impl OutgoingMessage {
    fn new(action: Action) -> Self {
        Self {
            action,
            text: None,
            room: None,
            to: None,
            manga_id: None,
        }
    }

    /// Room chat message. `room` is `None` for general chat.
    pub fn message(text: impl Into<String>, room: Option<&str>) -> Self {
        Self {
            text: Some(text.into()),
            room: room.map(str::to_string),
            ..Self::new(Action::Message)
        }
    }

    /// Ask for the list of users in the current room.
    pub fn users() -> Self {
        Self::new(Action::Users)
    }

    /// Private message to `to`.
    pub fn pm(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: Some(to.into()),
            text: Some(text.into()),
            ..Self::new(Action::Pm)
        }
    }

    /// Ask for connection status, scoped to a manga when one is joined.
    pub fn status(manga_id: Option<&str>) -> Self {
        Self {
            manga_id: manga_id.map(str::to_string),
            ..Self::new(Action::Status)
        }
    }
}

/// Chat room a session is joined to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Room {
    /// The general chat (no `room` query parameter).
    #[default]
    General,
    /// Discussion room for one manga.
    Manga(String),
}

impl Room {
    /// Room from an optional manga id; blank ids mean general chat.
    pub fn from_manga_id(manga_id: Option<&str>) -> Self {
        match manga_id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Manga(id.to_string()),
            _ => Self::General,
        }
    }

    /// Value for the `room` query parameter and message field.
    pub fn manga_id(&self) -> Option<&str> {
        match self {
            Self::General => None,
            Self::Manga(id) => Some(id),
        }
    }

    /// Room key used by the history endpoint.
    pub fn history_key(&self) -> &str {
        self.manga_id().unwrap_or(GENERAL_ROOM)
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "{GENERAL_ROOM}"),
            Self::Manga(id) => write!(f, "manga {id}"),
        }
    }
}

/// Response of `GET /chat/history`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatHistory {
    /// Room the history belongs to.
    pub room: String,
    /// Messages, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
}
