//! RFC 6455 frame codec.
//!
//! Single-frame messages only: every encoded frame carries FIN, and the
//! decoder rejects continuation frames.
//!
//! ```text
//!  byte 0      byte 1        extended length     mask key    payload
//! [FIN|op]  [MASK|len7]   [0, 2 or 8 bytes BE]  [0 or 4]   [len bytes]
//! ```
//!
//! Length classes: `len < 126` fits in `len7`; `len <= 65535` uses
//! `len7 = 126` plus a u16; anything larger uses `len7 = 127` plus a u64.
//!
//! Client frames are always masked with a fresh random key. Server frames
//! are normally unmasked, but the decoder honours the mask bit either way.

use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{WsError, WsResult};
use crate::constants::MAX_FRAME_SIZE;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN7_MASK: u8 = 0x7F;

/// Largest payload that fits in the 7-bit length field.
const MAX_SHORT_LEN: usize = 125;

/// Frame type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation of a fragmented message (rejected on decode).
    Continuation = 0x0,
    /// UTF-8 text frame.
    Text = 0x1,
    /// Binary frame.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl OpCode {
    /// Parse the low nibble of the first header byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

/// A single decoded (or to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub opcode: OpCode,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame from an opcode and payload.
    pub fn new(opcode: OpCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OpCode::Text, text.into().into_bytes())
    }

    /// Pong frame echoing `payload`.
    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Pong, payload)
    }

    /// Close frame with a status code and UTF-8 reason.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(OpCode::Close, payload)
    }

    /// Status code carried by a close frame, if any.
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Encode as a masked client frame using a fresh random mask key.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with_mask(Some(generate_mask()))
    }

    /// Encode with an explicit mask key, or unmasked when `mask` is `None`.
    ///
    /// Unmasked encoding is what a server produces; the client never sends
    /// unmasked frames.
    pub fn encode_with_mask(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let len = self.payload.len();
        let mut buf = Vec::with_capacity(14 + len);
        buf.push(FIN_BIT | self.opcode as u8);

        let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
        if len <= MAX_SHORT_LEN {
            buf.push(mask_bit | len as u8);
        } else if let Ok(len16) = u16::try_from(len) {
            buf.push(mask_bit | 126);
            buf.extend_from_slice(&len16.to_be_bytes());
        } else {
            buf.push(mask_bit | 127);
            buf.extend_from_slice(&(len as u64).to_be_bytes());
        }

        match mask {
            Some(key) => {
                buf.extend_from_slice(&key);
                let start = buf.len();
                buf.extend_from_slice(&self.payload);
                apply_mask(&mut buf[start..], key);
            }
            None => buf.extend_from_slice(&self.payload),
        }
        buf
    }
}

/// Fresh random mask key for a client frame.
pub fn generate_mask() -> [u8; 4] {
    rand::rng().random()
}

/// XOR `data` in place against the 4-byte key (`data[i] ^= key[i % 4]`).
///
/// Masking and unmasking are the same operation.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Fields of the fixed two-byte header.
#[derive(Debug, Clone, Copy)]
struct Head {
    opcode: OpCode,
    masked: bool,
    len7: u8,
}

fn parse_head(b0: u8, b1: u8) -> WsResult<Head> {
    if b0 & 0x70 != 0 {
        return Err(WsError::FrameDecode(format!(
            "reserved bits set in header byte 0x{b0:02x}"
        )));
    }
    let opcode = OpCode::from_u8(b0 & OPCODE_MASK).ok_or_else(|| {
        WsError::FrameDecode(format!("unknown opcode 0x{:x}", b0 & OPCODE_MASK))
    })?;
    if b0 & FIN_BIT == 0 || opcode == OpCode::Continuation {
        return Err(WsError::FrameDecode(
            "fragmented frames are not supported".to_string(),
        ));
    }
    Ok(Head {
        opcode,
        masked: b1 & MASK_BIT != 0,
        len7: b1 & LEN7_MASK,
    })
}

/// Number of extended length bytes announced by the 7-bit length field.
fn extended_len_size(len7: u8) -> usize {
    match len7 {
        126 => 2,
        127 => 8,
        _ => 0,
    }
}

/// Resolve the payload length from the 7-bit field and its extension.
fn payload_len(head: Head, ext: &[u8]) -> WsResult<usize> {
    let len = match head.len7 {
        126 => u64::from(u16::from_be_bytes([ext[0], ext[1]])),
        127 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(ext);
            u64::from_be_bytes(raw)
        }
        short => u64::from(short),
    };
    if len > MAX_FRAME_SIZE {
        return Err(WsError::FrameDecode(format!(
            "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }
    Ok(len as usize)
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame, or
/// the frame and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> WsResult<Option<(Frame, usize)>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let head = parse_head(buf[0], buf[1])?;
    let mut pos = 2;

    let ext_size = extended_len_size(head.len7);
    if buf.len() < pos + ext_size {
        return Ok(None);
    }
    let len = payload_len(head, &buf[pos..pos + ext_size])?;
    pos += ext_size;

    let mask = if head.masked {
        if buf.len() < pos + 4 {
            return Ok(None);
        }
        let key = [buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]];
        pos += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < pos + len {
        return Ok(None);
    }
    let mut payload = buf[pos..pos + len].to_vec();
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }
    Ok(Some((Frame::new(head.opcode, payload), pos + len)))
}

/// Read exactly one frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF before the first header byte. EOF
/// anywhere inside a frame is a decode error.
pub async fn read_frame<R>(reader: &mut R) -> WsResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut head_bytes = [0u8; 2];
    match reader.read(&mut head_bytes[..1]).await {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) => return Err(WsError::Read(e)),
    }
    read_exact(reader, &mut head_bytes[1..]).await?;
    let head = parse_head(head_bytes[0], head_bytes[1])?;

    let mut ext_buf = [0u8; 8];
    let ext = &mut ext_buf[..extended_len_size(head.len7)];
    read_exact(reader, ext).await?;
    let len = payload_len(head, ext)?;

    let mask = if head.masked {
        let mut key = [0u8; 4];
        read_exact(reader, &mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len];
    read_exact(reader, &mut payload).await?;
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }
    Ok(Some(Frame::new(head.opcode, payload)))
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> WsResult<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WsError::FrameDecode(
            "connection closed in the middle of a frame".to_string(),
        )),
        Err(e) => Err(WsError::Read(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const OPCODES: [OpCode; 4] = [OpCode::Text, OpCode::Ping, OpCode::Pong, OpCode::Close];
    const LENGTHS: [usize; 7] = [0, 1, 125, 126, 65535, 65536, 70000];

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_round_trip_all_opcodes_and_length_classes() {
        for opcode in OPCODES {
            for len in LENGTHS {
                let frame = Frame::new(opcode, payload(len));
                let wire = frame.encode();
                let (decoded, used) = decode(&wire).unwrap().unwrap();
                assert_eq!(decoded, frame, "opcode {opcode:?} len {len}");
                assert_eq!(used, wire.len());
            }
        }
    }

    #[test]
    fn test_large_text_round_trip() {
        for len in [65535, 65536, 70000] {
            let frame = Frame::new(OpCode::Text, payload(len));
            let (decoded, _) = decode(&frame.encode()).unwrap().unwrap();
            assert_eq!(decoded.payload.len(), len);
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_masking_uses_fresh_key_per_frame() {
        let frame = Frame::text("the same payload, twice over");
        // Two random 32-bit keys colliding is possible but astronomically rare;
        // retry a few times so the test is not flaky.
        let distinct = (0..4).any(|_| frame.encode() != frame.encode());
        assert!(distinct);

        let (a, _) = decode(&frame.encode()).unwrap().unwrap();
        let (b, _) = decode(&frame.encode()).unwrap().unwrap();
        assert_eq!(a.payload, b.payload);
        assert_eq!(a, frame);
    }

    #[test]
    fn test_client_frames_are_masked_and_final() {
        let wire = Frame::text("hi").encode();
        assert_eq!(wire[0], 0x81);
        assert_eq!(wire[1] & MASK_BIT, MASK_BIT);
        // Masked payload follows the key at offset 2..6
        let key = [wire[2], wire[3], wire[4], wire[5]];
        assert_eq!(wire[6], b'h' ^ key[0]);
        assert_eq!(wire[7], b'i' ^ key[1]);
    }

    #[test]
    fn test_length_class_boundaries() {
        let short = Frame::new(OpCode::Text, payload(125)).encode();
        assert_eq!(short[1] & LEN7_MASK, 125);
        assert_eq!(short.len(), 2 + 4 + 125);

        let medium = Frame::new(OpCode::Text, payload(126)).encode();
        assert_eq!(medium[1] & LEN7_MASK, 126);
        assert_eq!(u16::from_be_bytes([medium[2], medium[3]]), 126);
        assert_eq!(medium.len(), 2 + 2 + 4 + 126);

        let max_medium = Frame::new(OpCode::Text, payload(65535)).encode();
        assert_eq!(max_medium[1] & LEN7_MASK, 126);

        let long = Frame::new(OpCode::Text, payload(65536)).encode();
        assert_eq!(long[1] & LEN7_MASK, 127);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&long[2..10]);
        assert_eq!(u64::from_be_bytes(len_bytes), 65536);
        assert_eq!(long.len(), 2 + 8 + 4 + 65536);
    }

    #[test]
    fn test_decode_unmasked_server_frame() {
        let wire = Frame::text("from server").encode_with_mask(None);
        assert_eq!(wire[1] & MASK_BIT, 0);
        let (frame, used) = decode(&wire).unwrap().unwrap();
        assert_eq!(frame, Frame::text("from server"));
        assert_eq!(used, wire.len());
    }

    #[test]
    fn test_decode_partial_returns_none() {
        let wire = Frame::new(OpCode::Text, payload(300)).encode();
        for cut in [0, 1, 3, 7, wire.len() - 1] {
            assert!(decode(&wire[..cut]).unwrap().is_none(), "cut at {cut}");
        }
    }

    #[test]
    fn test_decode_rejects_fragmented_frames() {
        // FIN clear
        let mut wire = Frame::text("part").encode_with_mask(None);
        wire[0] &= !FIN_BIT;
        assert!(matches!(decode(&wire), Err(WsError::FrameDecode(_))));

        // Continuation opcode
        let wire = Frame::new(OpCode::Continuation, b"rest".to_vec()).encode_with_mask(None);
        assert!(matches!(decode(&wire), Err(WsError::FrameDecode(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        let wire = [FIN_BIT | 0x3, 0x00];
        assert!(matches!(decode(&wire), Err(WsError::FrameDecode(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut wire = vec![FIN_BIT | OpCode::Text as u8, 127];
        wire.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        assert!(matches!(decode(&wire), Err(WsError::FrameDecode(_))));

        let mut wire = vec![FIN_BIT | OpCode::Text as u8, 127];
        wire.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(decode(&wire), Err(WsError::FrameDecode(_))));
    }

    #[test]
    fn test_close_frame_carries_status_code() {
        let frame = Frame::close(1000, "");
        assert_eq!(frame.payload, vec![0x03, 0xE8]);
        assert_eq!(frame.close_code(), Some(1000));
        assert_eq!(Frame::new(OpCode::Close, Vec::new()).close_code(), None);
    }

    #[tokio::test]
    async fn test_read_frame_over_stream() {
        let (mut server, mut client) = tokio::io::duplex(1024);
        let first = Frame::text("one");
        let second = Frame::new(OpCode::Ping, b"beat".to_vec());
        server.write_all(&first.encode_with_mask(None)).await.unwrap();
        server.write_all(&second.encode()).await.unwrap();
        drop(server);

        assert_eq!(read_frame(&mut client).await.unwrap(), Some(first));
        assert_eq!(read_frame(&mut client).await.unwrap(), Some(second));
        assert_eq!(read_frame(&mut client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_truncated_is_decode_error() {
        let (mut server, mut client) = tokio::io::duplex(1024);
        let wire = Frame::text("truncated payload").encode_with_mask(None);
        server.write_all(&wire[..wire.len() - 3]).await.unwrap();
        drop(server);

        let result = read_frame(&mut client).await;
        assert!(matches!(result, Err(WsError::FrameDecode(_))));
    }
}
