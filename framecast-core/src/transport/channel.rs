//! The duplex channel seam.
//!
//! A [`DuplexChannel`] is one bidirectional, event-tagged link to an
//! ingestion endpoint. The [`TransportSession`](super::TransportSession)
//! owns exactly one and drives it through connect / send / close; it
//! never touches sockets itself. [`TcpChannel`](super::TcpChannel) is
//! the production implementation, tests plug in scripted ones.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{Endpoint, TransportHint};
use crate::error::StreamError;
use crate::frame::WirePayload;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub endpoint: Endpoint,
    /// Logical sub-channel selected during the handshake.
    pub channel: String,
    pub hint: TransportHint,
}

/// Asynchronous notification from an established link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The link is gone. Sent at most once per connection.
    Disconnected { reason: String },
    /// The peer emitted a tagged event.
    Message { tag: String, payload: WirePayload },
}

#[async_trait]
pub trait DuplexChannel: Send {
    /// Establish the link and complete the handshake.
    ///
    /// On success returns the receiver for this connection's events.
    /// Any previous connection must already have been closed.
    async fn connect(&mut self, target: &ChannelTarget)
    -> Result<mpsc::Receiver<ChannelEvent>, StreamError>;

    /// Emit one tagged event. Makes a single attempt.
    async fn send(&mut self, tag: &str, payload: WirePayload) -> Result<(), StreamError>;

    /// Tear down the current link. Idempotent.
    async fn close(&mut self);
}
