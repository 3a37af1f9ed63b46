//! Connection state machine for a transport session.
//!
//! Provides a `ConnectionState` enum that models the full lifecycle
//! of a streaming connection, with validated transitions that return
//! `Result` instead of panicking.

use std::fmt;

use crate::error::StreamError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of a transport session.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected ──► Streaming
///                     ▲    │           │             │
///                     │    ▼           ▼             │
///                     └─ Reconnecting ◄──────────────┘
///
///  any ──► Closed  (stop, configuration error, retries exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Session created, `start()` not called yet.
    #[default]
    Disconnected,

    /// Connect and handshake in progress.
    Connecting,

    /// Handshake complete; no frame sent yet on this link.
    Connected,

    /// At least one frame was sent successfully on this link.
    Streaming,

    /// Link lost or connect failed; waiting out the backoff delay.
    Reconnecting,

    /// Terminal. Resources released.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Streaming => "Streaming",
            Self::Reconnecting => "Reconnecting",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

impl ConnectionState {
    /// Returns `true` when frames may be handed to the channel.
    pub fn is_sendable(&self) -> bool {
        matches!(self, Self::Connected | Self::Streaming)
    }

    /// Returns `true` once the session reached its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        match (*self, to) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected) | (Connecting, Reconnecting) => true,
            (Connected, Streaming) => true,
            (Connected, Reconnecting) | (Streaming, Reconnecting) => true,
            (Reconnecting, Connecting) => true,
            _ => false,
        }
    }

    /// Apply a transition in place.
    ///
    /// Fails with [`StreamError::InvalidTransition`] and leaves `self`
    /// untouched when the transition is not allowed.
    pub fn transition(&mut self, to: ConnectionState) -> Result<ConnectionState, StreamError> {
        if !self.can_transition_to(to) {
            return Err(StreamError::InvalidTransition { from: *self, to });
        }
        let from = *self;
        *self = to;
        Ok(from)
    }
}

// ── StateTransition ──────────────────────────────────────────────

/// One applied state change, broadcast to session observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    /// Connect attempts made since the last successful handshake.
    pub attempt: u32,
}

// ── Tests ────────────────────────────────────────────────────────
