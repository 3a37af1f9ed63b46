//! Fixed-size frame header for the framecast wire protocol.
//!
//! ```text
//! magic:        [u8; 4]  "FCS1"
//! kind:         u8       MessageKind
//! flags:        u8       WireFlags
//! tag_len:      u16      length of the UTF-8 event tag
//! payload_len:  u32      length of the payload
//! checksum:     u32      blake3(tag ‖ payload)[0..4]
//! ```
//!
//! All integers are little-endian.

use bitflags::bitflags;

use crate::error::StreamError;
use crate::wire::message::MessageKind;

/// Magic bytes opening every frame.
pub const MAGIC: [u8; 4] = *b"FCS1";

/// Encoded size of [`WireHeader`].
pub const HEADER_SIZE: usize = 16;

/// Largest payload a single message may carry (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest event tag.
pub const MAX_TAG_SIZE: usize = 256;

bitflags! {
    /// Per-message flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WireFlags: u8 {
        /// Payload is a UTF-8 JSON document.
        const JSON = 0b0000_0001;
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub kind: MessageKind,
    pub flags: WireFlags,
    pub tag_len: u16,
    pub payload_len: u32,
    pub checksum: u32,
}

impl WireHeader {
    /// Total frame length (header + tag + payload).
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.tag_len as usize + self.payload_len as usize
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = self.kind as u8;
        buf[5] = self.flags.bits();
        buf[6..8].copy_from_slice(&self.tag_len.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse and validate a header. Does not check the checksum.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < HEADER_SIZE {
            return Err(StreamError::Protocol(format!(
                "header too short: {} < {HEADER_SIZE}",
                data.len()
            )));
        }
        if data[0..4] != MAGIC {
            return Err(StreamError::Protocol("invalid magic bytes".into()));
        }
        let kind = MessageKind::try_from(data[4])?;
        let flags = WireFlags::from_bits(data[5])
            .ok_or_else(|| StreamError::Protocol(format!("unknown flags {:#04x}", data[5])))?;
        let tag_len = u16::from_le_bytes([data[6], data[7]]);
        let payload_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let checksum = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

        if tag_len as usize > MAX_TAG_SIZE {
            return Err(StreamError::Protocol(format!(
                "tag too large: {tag_len} bytes (max {MAX_TAG_SIZE})"
            )));
        }
        if payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(StreamError::Protocol(format!(
                "payload too large: {payload_len} bytes (max {MAX_PAYLOAD_SIZE})"
            )));
        }

        Ok(Self {
            kind,
            flags,
            tag_len,
            payload_len,
            checksum,
        })
    }
}

/// Truncated blake3 digest over tag and payload.
pub fn checksum(tag: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tag);
    hasher.update(payload);
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
