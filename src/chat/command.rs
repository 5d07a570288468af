//! Input line parsing for the interactive session.
//!
//! Lines starting with `/` are commands; anything else is chat text.

use std::fmt;

/// Help text printed by `/help`.
pub const HELP: &str = "\
Commands:
  /help                 Show this help
  /users                List users in the room
  /pm <user> <message>  Send a private message
  /manga <id>           Switch to a manga discussion room
  /history              Show recent messages in this room
  /status               Show connection status
  /quit                 Leave the chat";

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat text for the current room.
    Say(String),
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// `/users`
    Users,
    /// `/pm <user> <text>`
    Pm {
        /// Recipient.
        to: String,
        /// Message body (may contain spaces).
        text: String,
    },
    /// `/manga <id>`
    Manga(String),
    /// `/history`
    History,
    /// `/status`
    Status,
    /// Any other `/word`.
    Unknown(String),
}

/// A recognised command with missing or bad arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    /// Expected syntax.
    pub usage: &'static str,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Usage: {}", self.usage)
    }
}

impl std::error::Error for UsageError {}

/// Parse one input line.
///
/// Returns `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>, UsageError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    let command = match name {
        "quit" => Command::Quit,
        "help" => Command::Help,
        "users" => Command::Users,
        "history" => Command::History,
        "status" => Command::Status,
        "pm" => {
            let usage = UsageError {
                usage: "/pm <user> <message>",
            };
            let (to, text) = args.split_once(char::is_whitespace).ok_or(usage.clone())?;
            let text = text.trim();
            if text.is_empty() {
                return Err(usage);
            }
            Command::Pm {
                to: to.to_string(),
                text: text.to_string(),
            }
        }
        "manga" => {
            let id = args.split_whitespace().next().ok_or(UsageError {
                usage: "/manga <id>",
            })?;
            Command::Manga(id.to_string())
        }
        other => Command::Unknown(format!("/{other}")),
    };
    Ok(Some(command))
}
