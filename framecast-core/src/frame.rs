//! Frame types shared across the pipeline.
//!
//! [`RawFrame`] is what a capture device produces; [`Frame`] is the
//! compressed, uniquely identified unit that travels through the
//! queue to the transport session.

use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::config::PayloadEncoding;
use crate::error::StreamError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 3 bytes per pixel: Blue, Green, Red (OpenCV / V4L default).
    Bgr8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// 1 byte per pixel.
    Gray8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Stable one-byte tag used in encoded payload headers.
    pub const fn tag(self) -> u8 {
        match self {
            PixelFormat::Rgb8 => 1,
            PixelFormat::Bgr8 => 2,
            PixelFormat::Rgba8 => 3,
            PixelFormat::Bgra8 => 4,
            PixelFormat::Gray8 => 5,
        }
    }

    /// Parse the names used in configuration files (`rgb24`, `bgr24`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rgb24" | "rgb8" => Some(Self::Rgb8),
            "bgr24" | "bgr8" => Some(Self::Bgr8),
            "rgba" | "rgba8" => Some(Self::Rgba8),
            "bgra" | "bgra8" => Some(Self::Bgra8),
            "gray" | "gray8" => Some(Self::Gray8),
            _ => None,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed frame obtained from a capture device.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may exceed `width * bytes_per_pixel` when the device pads
/// rows.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row pitch in **bytes**.
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// Wall-clock capture time.
    pub captured_at: SystemTime,
}

impl RawFrame {
    /// Bytes of pixel data in one row, without padding.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Whether the buffer is large enough for the declared geometry.
    pub fn is_consistent(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.stride as usize >= self.row_len()
            && self.data.len() >= self.stride as usize * self.height as usize
    }

    /// Returns a row slice without padding bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        &self.data[start..start + self.row_len()]
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One compressed image unit prepared for transmission.
///
/// Owned by the frame queue until dequeued, then discarded after a
/// single send attempt.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: Uuid,
    pub captured_at: SystemTime,
    pub payload: Bytes,
    pub encoding: PayloadEncoding,
}

impl Frame {
    /// Wrap an encoded payload with a freshly generated id.
    pub fn new(payload: Bytes, captured_at: SystemTime, encoding: PayloadEncoding) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at,
            payload,
            encoding,
        }
    }

    /// Size of the compressed payload in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Build the on-the-wire representation for this frame's mode.
    pub fn to_wire(&self) -> Result<WirePayload, StreamError> {
        match self.encoding {
            PayloadEncoding::Binary => Ok(WirePayload::Binary(self.payload.clone())),
            PayloadEncoding::Base64Json => {
                let body = JsonFrame {
                    id: self.id.to_string(),
                    frame: STANDARD.encode(&self.payload),
                };
                Ok(WirePayload::Json(Bytes::from(serde_json::to_vec(&body)?)))
            }
        }
    }
}

/// Structured payload shape expected by JSON ingestion gateways.
#[derive(Debug, Serialize)]
struct JsonFrame {
    id: String,
    frame: String,
}

// ── WirePayload ──────────────────────────────────────────────────

/// A payload ready to be emitted on a duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Binary(Bytes),
    /// UTF-8 JSON document.
    Json(Bytes),
}

impl WirePayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Binary(b) | Self::Json(b) => b,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
