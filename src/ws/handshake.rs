//! Client side of the HTTP/1.1 Upgrade handshake.
//!
//! Writes a literal upgrade request, then reads the response head line by
//! line. The connection is accepted only when the status line carries
//! `101` and `Sec-WebSocket-Accept` matches the key we sent.
//!
//! The returned [`BufReader`] may already hold the first frame bytes if the
//! server wrote them right behind the response head, so callers must keep
//! reading through it rather than the raw stream.

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::error::{WsError, WsResult};
use crate::constants::{MAX_HANDSHAKE_SIZE, WS_GUID};

/// Target of an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTarget {
    /// Value of the `Host` header (`host` or `host:port`).
    pub host: String,
    /// Request path, e.g. `/chat`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
}

impl HandshakeTarget {
    /// Request target as it appears on the request line.
    pub fn request_uri(&self) -> String {
        match self.query.as_deref() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }
}

/// Random 16-byte nonce, base64 encoded, for `Sec-WebSocket-Key`.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// `Sec-WebSocket-Accept` value a compliant server derives from `key`.
///
/// Base64(SHA-1(key + GUID)).
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Render the upgrade request for `target` using `key`.
pub fn build_request(target: &HandshakeTarget, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        target.request_uri(),
        target.host,
        key
    )
}

/// Perform the opening handshake over `stream`.
///
/// On failure the stream is shut down and dropped; it is never handed
/// back for reuse.
pub async fn client_handshake<S>(stream: S, target: &HandshakeTarget) -> WsResult<BufReader<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let mut reader = BufReader::new(stream);

    let result = exchange(&mut reader, target, &key).await;
    if let Err(e) = result {
        log::warn!("[WS] Handshake with {} failed: {e}", target.host);
        let _ = reader.get_mut().shutdown().await;
        return Err(e);
    }

    log::debug!("[WS] Upgraded connection to {}{}", target.host, target.request_uri());
    Ok(reader)
}

async fn exchange<S>(reader: &mut BufReader<S>, target: &HandshakeTarget, key: &str) -> WsResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_request(target, key);
    let stream = reader.get_mut();
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(WsError::Write)?;
    stream.flush().await.map_err(WsError::Write)?;

    let mut consumed = 0;
    let status = read_head_line(reader, &mut consumed).await?;
    if !status.contains("101") {
        return Err(WsError::HandshakeFailed(format!(
            "unexpected status line: {}",
            status.trim_end()
        )));
    }

    let expected_accept = accept_key(key);
    let mut accept_ok = false;
    loop {
        let line = read_head_line(reader, &mut consumed).await?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-accept") {
                accept_ok = value.trim() == expected_accept;
            }
        }
    }

    if !accept_ok {
        return Err(WsError::HandshakeFailed(
            "missing or invalid Sec-WebSocket-Accept".to_string(),
        ));
    }
    Ok(())
}

/// Read one CRLF-terminated line of the response head, enforcing the
/// overall size limit.
async fn read_head_line<S>(reader: &mut BufReader<S>, consumed: &mut usize) -> WsResult<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    let n = reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(WsError::Read)?;
    if n == 0 {
        return Err(WsError::HandshakeFailed(
            "connection closed during handshake".to_string(),
        ));
    }
    *consumed += n;
    if *consumed > MAX_HANDSHAKE_SIZE {
        return Err(WsError::HandshakeFailed(format!(
            "response head exceeds {MAX_HANDSHAKE_SIZE} bytes"
        )));
    }
    String::from_utf8(raw)
        .map_err(|e| WsError::HandshakeFailed(format!("response head is not UTF-8: {e}")))
}
