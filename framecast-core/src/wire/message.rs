//! Wire message kinds and control bodies.
//!
//! Uses proper enums with `TryFrom`; no panics on unknown values.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::frame::WirePayload;
use crate::wire::header::{MAX_PAYLOAD_SIZE, MAX_TAG_SIZE, WireFlags, WireHeader, checksum};

// ── MessageKind ──────────────────────────────────────────────────

/// Discriminates the messages exchanged on a framecast link.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Client → server: select a channel.
    Hello = 0x01,
    /// Server → client: channel accepted.
    Welcome = 0x02,
    /// Server → client: channel refused.
    Reject = 0x03,
    /// Either direction: a tagged event (frames, status updates).
    Event = 0x10,
    /// Either direction: keep-alive.
    Heartbeat = 0x20,
    /// Either direction: graceful disconnect.
    Goodbye = 0x21,
}

impl TryFrom<u8> for MessageKind {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Hello),
            0x02 => Ok(Self::Welcome),
            0x03 => Ok(Self::Reject),
            0x10 => Ok(Self::Event),
            0x20 => Ok(Self::Heartbeat),
            0x21 => Ok(Self::Goodbye),
            other => Err(StreamError::Protocol(format!(
                "unknown message kind {other:#04x}"
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Control bodies ───────────────────────────────────────────────

/// Handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Logical sub-channel / namespace, e.g. `/videostream`.
    pub channel: String,
    /// Client identification, `name/version`.
    pub client: String,
    pub low_latency: bool,
}

/// Handshake acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Server-assigned id for this connection.
    pub session_id: String,
}

/// Handshake refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    pub reason: String,
}

// ── WireMessage ──────────────────────────────────────────────────

/// One decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    kind: MessageKind,
    flags: WireFlags,
    tag: String,
    payload: Bytes,
}

impl WireMessage {
    /// Build a message, enforcing size limits.
    pub fn new(
        kind: MessageKind,
        flags: WireFlags,
        tag: impl Into<String>,
        payload: Bytes,
    ) -> Result<Self, StreamError> {
        let tag = tag.into();
        if tag.len() > MAX_TAG_SIZE {
            return Err(StreamError::Protocol(format!(
                "tag too large: {} bytes (max {MAX_TAG_SIZE})",
                tag.len()
            )));
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(StreamError::Protocol(format!(
                "payload too large: {} bytes (max {MAX_PAYLOAD_SIZE})",
                payload.len()
            )));
        }
        Ok(Self {
            kind,
            flags,
            tag,
            payload,
        })
    }

    pub fn hello(body: &Hello) -> Result<Self, StreamError> {
        Self::control(MessageKind::Hello, body)
    }

    pub fn welcome(body: &Welcome) -> Result<Self, StreamError> {
        Self::control(MessageKind::Welcome, body)
    }

    pub fn reject(body: &Reject) -> Result<Self, StreamError> {
        Self::control(MessageKind::Reject, body)
    }

    /// A tagged event carrying a frame or any other payload.
    pub fn event(tag: &str, payload: WirePayload) -> Result<Self, StreamError> {
        let flags = if payload.is_json() {
            WireFlags::JSON
        } else {
            WireFlags::empty()
        };
        let bytes = match payload {
            WirePayload::Binary(b) | WirePayload::Json(b) => b,
        };
        Self::new(MessageKind::Event, flags, tag, bytes)
    }

    pub fn heartbeat() -> Self {
        Self {
            kind: MessageKind::Heartbeat,
            flags: WireFlags::empty(),
            tag: String::new(),
            payload: Bytes::new(),
        }
    }

    pub fn goodbye() -> Self {
        Self {
            kind: MessageKind::Goodbye,
            flags: WireFlags::empty(),
            tag: String::new(),
            payload: Bytes::new(),
        }
    }

    fn control<T: Serialize>(kind: MessageKind, body: &T) -> Result<Self, StreamError> {
        let payload = bincode::serialize(body)?;
        Self::new(kind, WireFlags::empty(), String::new(), Bytes::from(payload))
    }

    /// Deserialize a bincode control body.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn flags(&self) -> WireFlags {
        self.flags
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Reinterpret an event's payload according to its flags.
    pub fn into_wire_payload(self) -> WirePayload {
        if self.flags.contains(WireFlags::JSON) {
            WirePayload::Json(self.payload)
        } else {
            WirePayload::Binary(self.payload)
        }
    }

    /// Header describing this message.
    pub fn header(&self) -> WireHeader {
        WireHeader {
            kind: self.kind,
            flags: self.flags,
            tag_len: self.tag.len() as u16,
            payload_len: self.payload.len() as u32,
            checksum: checksum(self.tag.as_bytes(), &self.payload),
        }
    }
}
