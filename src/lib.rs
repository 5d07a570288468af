//! MangaHub command-line client.
//!
//! The interesting part is the chat client: a hand-written RFC 6455
//! WebSocket transport and an interactive session on top of it.
//!
//! # Modules
//!
//! - [`ws`] - WebSocket handshake, frame codec and connection
//! - [`chat`] - Chat types, input commands, rendering, history and the session
//! - [`commands`] - CLI subcommands
//! - [`config`] - Configuration loading/saving
//! - [`constants`] - Protocol and timing constants

pub mod chat;
pub mod commands;
pub mod config;
pub mod constants;
pub mod ws;

pub use chat::{Session, SessionConfig};
pub use config::Config;
