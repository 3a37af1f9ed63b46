//! Domain-specific error types for the streaming pipeline.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! Per-frame failures (encode, transmit) are absorbed by the scheduler;
//! capture and configuration failures end the session.

use std::time::Duration;
use thiserror::Error;

use crate::state::ConnectionState;

/// The canonical error type for framecast.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Pipeline Errors ──────────────────────────────────────────
    /// The capture device is unreachable, failed, or produced a
    /// malformed frame. Fatal to the session.
    #[error("capture error: {0}")]
    Capture(String),

    /// A single frame could not be compressed. The frame is skipped.
    #[error("encode error: {0}")]
    Encode(String),

    /// A single frame could not be transmitted. The frame is discarded.
    #[error("transmit error: {0}")]
    Transmit(String),

    // ── Connection Errors ────────────────────────────────────────
    /// Connecting, handshaking or keeping the link alive failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The first connection was not established within the deadline.
    #[error("initial connection not established within {0:?}")]
    InitialConnect(Duration),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A state change was requested that the state machine forbids.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The TCP/IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that violate the wire format.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Encoding or decoding of a structured payload failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Startup Errors ───────────────────────────────────────────
    /// Invalid configuration. Fatal at startup, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StreamError {
    /// Whether this error must terminate the session instead of being
    /// absorbed by a retry or skip policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Capture(_) | Self::Configuration(_) | Self::InitialConnect(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StreamError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for StreamError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        StreamError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}
