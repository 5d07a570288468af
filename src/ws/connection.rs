//! Message-level WebSocket connection.
//!
//! A [`Connection`] owns one upgraded socket. It splits into a cloneable
//! [`ConnectionSender`] and a single [`ConnectionReceiver`]:
//!
//! - Writes from any task go through the sender's mutex, so a pong from the
//!   receive loop can never interleave with a chat message from the input
//!   loop.
//! - Reads are not locked. Only the task that owns the receiver reads.
//!
//! Ping and close frames are handled inside [`ConnectionReceiver::receive`];
//! callers only ever see chat [`Message`]s or end-of-stream.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Url;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::error::{WsError, WsResult};
use super::frame::{read_frame, Frame, OpCode};
use super::handshake::{client_handshake, HandshakeTarget};
use crate::chat::types::{Message, OutgoingMessage};
use crate::constants::{CLOSE_NORMAL, CONNECT_TIMEOUT};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where to dial and what to put in the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port` for the TCP connect.
    pub addr: String,
    /// Upgrade request target.
    pub target: HandshakeTarget,
}

impl Endpoint {
    /// Parse a `ws://` URL and append `room=<room>` when a room is given.
    ///
    /// `wss://` is rejected; this client does not speak TLS.
    pub fn parse(url: &str, room: Option<&str>) -> WsResult<Self> {
        let mut url =
            Url::parse(url).map_err(|e| WsError::InvalidUrl(format!("{url}: {e}")))?;
        if url.scheme() != "ws" {
            return Err(WsError::InvalidUrl(format!(
                "unsupported scheme '{}' (only ws:// is supported)",
                url.scheme()
            )));
        }
        if let Some(room) = room {
            url.query_pairs_mut().append_pair("room", room);
        }

        let host = url
            .host_str()
            .ok_or_else(|| WsError::InvalidUrl(format!("{url}: missing host")))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let host_header = match url.port() {
            Some(p) => format!("{host}:{p}"),
            None => host.clone(),
        };

        Ok(Self {
            addr: format!("{host}:{port}"),
            target: HandshakeTarget {
                host: host_header,
                path: url.path().to_string(),
                query: url.query().map(str::to_string),
            },
        })
    }
}

/// An open WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    sender: ConnectionSender,
    receiver: ConnectionReceiver,
}

impl Connection {
    /// Dial `url`, run the upgrade handshake, and wrap the socket.
    ///
    /// `room` becomes the `room` query parameter; `None` joins general chat.
    pub async fn connect(url: &str, room: Option<&str>) -> WsResult<Self> {
        let endpoint = Endpoint::parse(url, room)?;
        log::info!("[WS] Connecting to {}{}", endpoint.addr, endpoint.target.request_uri());

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&endpoint.addr))
            .await
            .map_err(|elapsed| WsError::Connect(io::Error::new(io::ErrorKind::TimedOut, elapsed)))?
            .map_err(WsError::Connect)?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[WS] set_nodelay failed: {e}");
        }

        let upgraded = client_handshake(stream, &endpoint.target).await?;
        log::info!("[WS] Connected to {}", endpoint.addr);
        Ok(Self::from_upgraded(upgraded))
    }

    /// Wrap a stream whose handshake has already completed.
    pub fn from_upgraded<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let sender = ConnectionSender {
            inner: Arc::new(SenderInner {
                writer: Mutex::new(Box::new(write_half)),
                closed: AtomicBool::new(false),
            }),
        };
        let receiver = ConnectionReceiver {
            reader: Box::new(read_half),
            pong: sender.clone(),
        };
        Self { sender, receiver }
    }

    /// Send one chat message as a text frame.
    pub async fn send(&self, message: &OutgoingMessage) -> WsResult<()> {
        self.sender.send(message).await
    }

    /// Wait for the next chat message; `Ok(None)` means the peer is gone.
    pub async fn receive(&mut self) -> WsResult<Option<Message>> {
        self.receiver.receive().await
    }

    /// Send a normal-closure close frame and shut the socket. Idempotent.
    pub async fn close(&self) -> WsResult<()> {
        self.sender.close().await
    }

    /// Split into the write and read halves for use on separate tasks.
    pub fn into_split(self) -> (ConnectionSender, ConnectionReceiver) {
        (self.sender, self.receiver)
    }
}

struct SenderInner {
    writer: Mutex<BoxedWriter>,
    closed: AtomicBool,
}

/// Write half of a [`Connection`]. Cheap to clone; all clones share one lock.
#[derive(Clone)]
pub struct ConnectionSender {
    inner: Arc<SenderInner>,
}

impl std::fmt::Debug for ConnectionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSender")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ConnectionSender {
    /// Serialize `message` to JSON and send it as a text frame.
    pub async fn send(&self, message: &OutgoingMessage) -> WsResult<()> {
        let json = serde_json::to_string(message)?;
        log::debug!("[WS] -> {json}");
        self.send_frame(&Frame::text(json)).await
    }

    /// Encode and write one frame under the write lock.
    pub async fn send_frame(&self, frame: &Frame) -> WsResult<()> {
        if self.is_closed() {
            return Err(WsError::Write(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            )));
        }
        let bytes = frame.encode();
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&bytes).await.map_err(WsError::Write)?;
        writer.flush().await.map_err(WsError::Write)
    }

    /// Send a close frame (1000, empty reason) and shut down the socket.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub async fn close(&self) -> WsResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let bytes = Frame::close(CLOSE_NORMAL, "").encode();
        let mut writer = self.inner.writer.lock().await;
        let written = writer.write_all(&bytes).await;
        if let Err(e) = writer.shutdown().await {
            log::debug!("[WS] Shutdown after close frame failed: {e}");
        }
        log::info!("[WS] Connection closed");
        written.map_err(WsError::Write)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Read half of a [`Connection`]. Owned by exactly one receive loop.
pub struct ConnectionReceiver {
    reader: BoxedReader,
    pong: ConnectionSender,
}

impl std::fmt::Debug for ConnectionReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionReceiver").finish_non_exhaustive()
    }
}

impl ConnectionReceiver {
    /// Block until a chat message arrives or the stream ends.
    ///
    /// Pings are answered with a pong carrying the same payload and never
    /// returned. A close frame or EOF yields `Ok(None)`. Text frames that
    /// are not valid message JSON are logged and skipped.
    pub async fn receive(&mut self) -> WsResult<Option<Message>> {
        loop {
            let Some(frame) = read_frame(&mut self.reader).await? else {
                log::info!("[WS] Peer closed the socket");
                return Ok(None);
            };

            match frame.opcode {
                OpCode::Text => match serde_json::from_slice::<Message>(&frame.payload) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => {
                        log::warn!(
                            "[WS] Skipping malformed message ({e}): {}",
                            String::from_utf8_lossy(&frame.payload)
                        );
                    }
                },
                OpCode::Ping => {
                    log::trace!("[WS] Ping ({} bytes), replying", frame.payload.len());
                    self.pong.send_frame(&Frame::pong(frame.payload)).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    log::info!("[WS] Close frame received (code {:?})", frame.close_code());
                    return Ok(None);
                }
                OpCode::Binary => {
                    log::warn!("[WS] Ignoring binary frame ({} bytes)", frame.payload.len());
                }
                OpCode::Continuation => {
                    return Err(WsError::FrameDecode(
                        "unexpected continuation frame".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::frame::decode;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn pair() -> (Connection, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (Connection::from_upgraded(client), server)
    }

    async fn server_send(server: &mut DuplexStream, frame: Frame) {
        server.write_all(&frame.encode_with_mask(None)).await.unwrap();
    }

    async fn server_read_all(mut server: DuplexStream) -> Vec<Frame> {
        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        let mut frames = Vec::new();
        let mut rest = wire.as_slice();
        while let Some((frame, used)) = decode(rest).unwrap() {
            frames.push(frame);
            rest = &rest[used..];
        }
        assert!(rest.is_empty());
        frames
    }

    const HI: &str = r#"{"timestamp":"2024-01-01T10:00:00Z","user":"alice","text":"hi"}"#;

    #[test]
    fn test_endpoint_with_room() {
        let endpoint = Endpoint::parse("ws://localhost:9093/chat", Some("one-piece")).unwrap();
        assert_eq!(endpoint.addr, "localhost:9093");
        assert_eq!(endpoint.target.host, "localhost:9093");
        assert_eq!(endpoint.target.path, "/chat");
        assert_eq!(endpoint.target.query.as_deref(), Some("room=one-piece"));
    }

    #[test]
    fn test_endpoint_general_room_has_no_query() {
        let endpoint = Endpoint::parse("ws://chat.example.com/chat", None).unwrap();
        assert_eq!(endpoint.addr, "chat.example.com:80");
        assert_eq!(endpoint.target.host, "chat.example.com");
        assert_eq!(endpoint.target.request_uri(), "/chat");
    }

    #[test]
    fn test_endpoint_room_is_url_encoded() {
        let endpoint = Endpoint::parse("ws://localhost:9093/chat", Some("a b&c")).unwrap();
        assert_eq!(endpoint.target.query.as_deref(), Some("room=a+b%26c"));
    }

    #[test]
    fn test_endpoint_rejects_wss_and_garbage() {
        assert!(matches!(
            Endpoint::parse("wss://localhost/chat", None),
            Err(WsError::InvalidUrl(_))
        ));
        assert!(matches!(
            Endpoint::parse("not a url", None),
            Err(WsError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_send_writes_masked_json_text_frame() {
        let (conn, server) = pair();
        conn.send(&OutgoingMessage::message("hello", Some("one-piece")))
            .await
            .unwrap();
        drop(conn);

        let frames = server_read_all(server).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, OpCode::Text);
        let json: serde_json::Value = serde_json::from_slice(&frames[0].payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"action": "message", "text": "hello", "room": "one-piece"})
        );
    }

    #[tokio::test]
    async fn test_ping_is_answered_and_not_surfaced() {
        let (mut conn, mut server) = pair();
        server_send(&mut server, Frame::new(OpCode::Ping, b"keepalive".to_vec())).await;
        server_send(&mut server, Frame::text(HI)).await;

        let message = conn.receive().await.unwrap().unwrap();
        assert_eq!(message.user, "alice");
        assert_eq!(message.text, "hi");
        drop(conn);

        let frames = server_read_all(server).await;
        assert_eq!(frames, vec![Frame::pong(b"keepalive".to_vec())]);
    }

    #[tokio::test]
    async fn test_close_frame_ends_stream() {
        let (mut conn, mut server) = pair();
        server_send(&mut server, Frame::close(1001, "going away")).await;
        assert!(conn.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_ends_stream() {
        let (mut conn, server) = pair();
        drop(server);
        assert!(conn.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_is_skipped() {
        let (mut conn, mut server) = pair();
        server_send(&mut server, Frame::text("{not json")).await;
        server_send(&mut server, Frame::new(OpCode::Binary, vec![1, 2, 3])).await;
        server_send(&mut server, Frame::text(HI)).await;
        let message = conn.receive().await.unwrap().unwrap();
        assert_eq!(message.text, "hi");
    }

    #[tokio::test]
    async fn test_truncated_frame_is_error() {
        let (mut conn, mut server) = pair();
        let wire = Frame::text(HI).encode_with_mask(None);
        server.write_all(&wire[..10]).await.unwrap();
        drop(server);
        assert!(matches!(conn.receive().await, Err(WsError::FrameDecode(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, server) = pair();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.sender.is_closed());

        let frames = server_read_all(server).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].close_code(), Some(CLOSE_NORMAL));
        assert_eq!(frames[0].payload.len(), 2);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, _server) = pair();
        conn.close().await.unwrap();
        let result = conn.send(&OutgoingMessage::users()).await;
        assert!(matches!(result, Err(WsError::Write(_))));
    }

    #[tokio::test]
    async fn test_concurrent_senders_do_not_interleave() {
        let (conn, server) = pair();
        let (sender, receiver) = conn.into_split();
        let big = "x".repeat(20_000);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let sender = sender.clone();
            let text = big.clone();
            tasks.push(tokio::spawn(async move {
                sender.send(&OutgoingMessage::message(text, None)).await.unwrap();
            }));
        }
        let reader = tokio::spawn(server_read_all(server));
        for task in tasks {
            task.await.unwrap();
        }
        drop(sender);
        drop(receiver);

        let frames = reader.await.unwrap();
        assert_eq!(frames.len(), 8);
        assert!(frames.iter().all(|f| f.opcode == OpCode::Text));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = Connection::connect(&format!("ws://{addr}/chat"), None).await;
        assert!(matches!(result, Err(WsError::Connect(_))));
    }
}
