//! Transport error taxonomy.
//!
//! Every failure the WebSocket layer can surface to the chat session.
//! End-of-stream is not an error: a close frame or EOF is reported
//! as `Ok(None)` from [`ConnectionReceiver::receive`](super::ConnectionReceiver::receive).

use std::io;

/// Errors raised by the WebSocket client transport.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The endpoint URL could not be used (bad syntax, unsupported scheme).
    #[error("invalid WebSocket endpoint: {0}")]
    InvalidUrl(String),

    /// TCP connection to the endpoint failed or timed out.
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    /// The HTTP Upgrade exchange did not produce a WebSocket connection.
    #[error("WebSocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer sent bytes that are not a well-formed frame.
    #[error("malformed frame: {0}")]
    FrameDecode(String),

    /// Reading from the socket failed.
    #[error("socket read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing to the socket failed (including automatic pong replies).
    #[error("socket write failed: {0}")]
    Write(#[source] io::Error),

    /// An outgoing message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result alias for transport operations.
pub type WsResult<T> = Result<T, WsError>;

impl WsError {
    /// Returns `true` for errors that mean the peer is unreachable or gone,
    /// as opposed to a local programming or configuration problem.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Read(_) | Self::Write(_) | Self::FrameDecode(_)
        )
    }
}
