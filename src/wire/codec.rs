//! Binary framing for probe messages.
//!
//! Frame layout, all integers big-endian:
//! - 1 byte magic
//! - 1 byte format version
//! - 8 bytes sequence
//! - 8 bytes produced-at (epoch milliseconds)
//! - 4 bytes payload length, then the payload
//!
//! Decoding rejects bad magic, unknown versions, and truncated frames; it
//! never yields a partially filled message.

use super::message::ProbeMessage;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// First byte of every probe frame.
pub const FRAME_MAGIC: u8 = 0xA7;

/// Current frame format version.
pub const FRAME_VERSION: u8 = 1;

/// Fixed header size preceding the payload.
const HEADER_LEN: usize = 1 + 1 + 8 + 8 + 4;

/// Upper bound on the declared payload length (16MB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("bad frame magic 0x{0:02x}")]
    BadMagic(u8),
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated frame: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },
    #[error("declared payload length {0} exceeds limit")]
    PayloadTooLarge(usize),
}

/// Encode a message into a self-describing frame.
pub fn encode(msg: &ProbeMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + msg.payload.len());
    buf.put_u8(FRAME_MAGIC);
    buf.put_u8(FRAME_VERSION);
    buf.put_u64(msg.sequence);
    buf.put_i64(msg.produced_at_ms);
    buf.put_u32(msg.payload.len() as u32);
    buf.put_slice(&msg.payload);
    buf.freeze()
}

/// Decode a frame produced by [`encode`].
pub fn decode(data: &[u8]) -> Result<ProbeMessage, CodecError> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN,
            have: data.len(),
        });
    }
    let mut buf = data;
    let magic = buf.get_u8();
    if magic != FRAME_MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    let version = buf.get_u8();
    if version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let sequence = buf.get_u64();
    let produced_at_ms = buf.get_i64();
    let payload_len = buf.get_u32() as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(payload_len));
    }
    if buf.len() < payload_len {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN + payload_len,
            have: data.len(),
        });
    }
    Ok(ProbeMessage {
        sequence,
        produced_at_ms,
        payload: buf[..payload_len].to_vec(),
    })
}
