use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::kind_name;

/// Frame header: magic (2) + length (4) + kind (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "SF" (0x53 0x46).
pub const MAGIC: [u8; 2] = [0x53, 0x46];

/// Default maximum wire payload: 16 MiB, comfortably above a 1 MiB content chunk.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One message on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the payload holds; see [`crate::kind`].
    pub kind: u16,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A frame with no payload.
    pub fn empty(kind: u16) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Human-readable kind.
    pub fn kind_name(&self) -> &'static str {
        kind_name(self.kind)
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌──────────────┬───────────┬──────────┬──────────────────┐
/// │ Magic (2B)   │ Length    │ Kind     │ Payload          │
/// │ 0x53 0x46    │ (4B LE)   │ (2B LE)  │ (Length bytes)   │
/// │ "SF"         │           │          │                  │
/// └──────────────┴───────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(kind: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(kind);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` until `src` holds a complete frame, then consumes it.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut header = &src[2..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let kind = header.get_u16_le();

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { kind, payload }))
}

/// Configuration for wire frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout applied to socket-backed streams.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout applied to socket-backed streams.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
