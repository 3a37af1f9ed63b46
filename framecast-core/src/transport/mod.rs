//! Transport layer: the duplex channel seam, its TCP implementation and
//! the reconnecting session built on top.

pub mod channel;
pub mod session;
pub mod tcp;

pub use channel::{ChannelEvent, ChannelTarget, DuplexChannel};
pub use session::{SendOutcome, TransportSession};
pub use tcp::TcpChannel;
