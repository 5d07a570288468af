//! WebSocket client transport.
//!
//! A small RFC 6455 client written directly against a TCP stream: the
//! opening handshake, the frame codec, and a message-level connection on
//! top of both. All chat traffic in the crate goes through this module.
//!
//! # Architecture
//!
//! ```text
//! Connection::connect(url, room)
//!   ├─ Endpoint::parse        ws://host:port/chat?room=<id>
//!   ├─ TcpStream::connect
//!   ├─ handshake::client_handshake   GET ... Upgrade: websocket → 101
//!   └─ split ─┬─ ConnectionSender    (cloneable, writes under a mutex)
//!             └─ ConnectionReceiver  (single reader, answers pings)
//!                        │
//!                   frame::read_frame / Frame::encode
//! ```
//!
//! Not supported: fragmented messages, TLS (`wss://`), extensions and
//! subprotocols.

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;

pub use connection::{Connection, ConnectionReceiver, ConnectionSender, Endpoint};
pub use error::{WsError, WsResult};
pub use frame::{Frame, OpCode};

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Convert a WS(S) URL to HTTP(S) scheme.
///
/// Passes `http://` and `https://` through unchanged.
#[must_use]
pub fn ws_to_http_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}
