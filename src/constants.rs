//! Application-wide constants for mangahub.
//!
//! This module centralizes magic numbers and protocol constants so the
//! transport and the chat session agree on them. Constants are grouped
//! by domain.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **WebSocket**: RFC 6455 limits and close codes
//! - **Chat**: Endpoint paths and history defaults

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for the chat history endpoint.
///
/// History requests are small JSON documents; 10 seconds is plenty while
/// keeping `/history` from hanging the input loop on a dead server.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP connect timeout for the chat WebSocket endpoint.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// WebSocket
// ============================================================================

/// GUID appended to `Sec-WebSocket-Key` when computing `Sec-WebSocket-Accept`.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on a single decoded frame payload (16 MB).
///
/// Guards against a bogus 8-byte length field forcing an unbounded
/// allocation.
pub const MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;

/// Upper bound on the handshake response head (status line + headers).
pub const MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

/// Close status code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

// ============================================================================
// Chat
// ============================================================================

/// Path of the chat WebSocket endpoint.
pub const CHAT_PATH: &str = "/chat";

/// Path of the chat history HTTP endpoint.
pub const HISTORY_PATH: &str = "/chat/history";

/// Number of messages fetched by `/history` and `mangahub history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Display name of the room used when no manga is selected.
pub const GENERAL_ROOM: &str = "general";
