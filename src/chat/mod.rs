//! MangaHub chat client.
//!
//! Everything above the WebSocket transport: wire types, input parsing,
//! rendering, the history HTTP client and the interactive [`Session`].

pub mod command;
pub mod console;
pub mod history;
pub mod render;
pub mod session;
pub mod types;

pub use command::{Command, UsageError};
pub use console::{Console, Stdout};
pub use history::HistoryClient;
pub use session::{Interrupter, Session, SessionConfig, SessionState, StopSignal};
pub use types::{ChatHistory, Message, OutgoingMessage, Room};
