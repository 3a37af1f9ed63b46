//! Frame encoder with zstd compression.
//!
//! Turns a [`RawFrame`] into the compressed payload carried by a
//! [`Frame`](crate::frame::Frame). The payload is a small geometry
//! header followed by the zstd-compressed, tightly packed pixel rows:
//!
//! ```text
//! width:    u32
//! height:   u32
//! format:   u8     PixelFormat::tag()
//! row_len:  u32    bytes per packed row
//! pixels:   zstd(rows)
//! ```
//!
//! All integers are little-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::StreamError;
use crate::frame::RawFrame;

/// Size of the geometry header in front of the compressed rows.
pub const PAYLOAD_HEADER_SIZE: usize = 13;

/// Highest zstd level the quality mapping selects.
const MAX_LEVEL: i32 = 19;

// ── FrameEncoder ─────────────────────────────────────────────────

/// Compresses one raw frame into a transmittable payload.
pub trait FrameEncoder: Send {
    /// Encode `raw` at `quality` (1..=100).
    fn encode(&mut self, raw: &RawFrame, quality: u8) -> Result<Bytes, StreamError>;

    /// Short codec name for logs.
    fn name(&self) -> &'static str;
}

// ── ZstdEncoder ──────────────────────────────────────────────────

/// Lossless zstd encoder.
///
/// Quality selects the effort: 100 maps to level 1 (fast, larger),
/// lower quality trades CPU for smaller payloads, up to level 19.
#[derive(Debug, Default)]
pub struct ZstdEncoder {
    frame_count: u64,
}

impl ZstdEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// zstd level for a quality value.
    pub fn level_for(quality: u8) -> i32 {
        let quality = quality.clamp(1, 100) as i32;
        (1 + (100 - quality) * (MAX_LEVEL - 1) / 99).clamp(1, MAX_LEVEL)
    }

    /// Number of frames encoded so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Emit all rows packed tightly (no padding).
    fn pack_rows(raw: &RawFrame) -> Vec<u8> {
        let mut out = Vec::with_capacity(raw.row_len() * raw.height as usize);
        for y in 0..raw.height {
            out.extend_from_slice(raw.row(y));
        }
        out
    }
}

impl FrameEncoder for ZstdEncoder {
    fn encode(&mut self, raw: &RawFrame, quality: u8) -> Result<Bytes, StreamError> {
        if !raw.is_consistent() {
            return Err(StreamError::Encode(format!(
                "inconsistent frame {}x{} stride {} with {} bytes",
                raw.width,
                raw.height,
                raw.stride,
                raw.data.len()
            )));
        }

        let packed = Self::pack_rows(raw);
        let compressed = zstd::encode_all(packed.as_slice(), Self::level_for(quality))
            .map_err(|e| StreamError::Encode(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(PAYLOAD_HEADER_SIZE + compressed.len());
        out.put_u32_le(raw.width);
        out.put_u32_le(raw.height);
        out.put_u8(raw.format.tag());
        out.put_u32_le(raw.row_len() as u32);
        out.put_slice(&compressed);

        self.frame_count += 1;
        Ok(out.freeze())
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use std::time::SystemTime;

    fn padded_frame(w: u32, h: u32) -> RawFrame {
        let stride = w * 4 + 8;
        let mut data = vec![0xEEu8; (stride * h) as usize];
        for y in 0..h as usize {
            for x in 0..(w * 4) as usize {
                data[y * stride as usize + x] = (x % 251) as u8;
            }
        }
        RawFrame {
            width: w,
            height: h,
            stride,
            format: PixelFormat::Bgra8,
            data,
            captured_at: SystemTime::now(),
        }
    }

    #[test]
    fn payload_header_and_padding_removed() {
        let raw = padded_frame(16, 8);
        let payload = ZstdEncoder::new().encode(&raw, 80).unwrap();

        assert_eq!(u32::from_le_bytes(payload[0..4].try_into().unwrap()), 16);
        assert_eq!(u32::from_le_bytes(payload[4..8].try_into().unwrap()), 8);
        assert_eq!(payload[8], PixelFormat::Bgra8.tag());
        assert_eq!(u32::from_le_bytes(payload[9..13].try_into().unwrap()), 64);

        let pixels = zstd::decode_all(&payload[PAYLOAD_HEADER_SIZE..]).unwrap();
        assert_eq!(pixels.len(), 16 * 4 * 8);
        assert!(!pixels.contains(&0xEE));
    }

    #[test]
    fn quality_maps_to_level() {
        assert_eq!(ZstdEncoder::level_for(100), 1);
        assert_eq!(ZstdEncoder::level_for(80), 4);
        assert_eq!(ZstdEncoder::level_for(1), MAX_LEVEL);
        assert!(ZstdEncoder::level_for(0) >= 1);
        assert!(ZstdEncoder::level_for(50) > ZstdEncoder::level_for(90));
    }

    #[test]
    fn inconsistent_frame_is_encode_error() {
        let mut raw = padded_frame(4, 4);
        raw.data.truncate(10);
        let mut enc = ZstdEncoder::new();
        let err = enc.encode(&raw, 80).unwrap_err();
        assert!(matches!(err, StreamError::Encode(_)));
        assert!(!err.is_fatal());
        assert_eq!(enc.frame_count(), 0);
    }
}
