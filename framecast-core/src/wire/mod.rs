//! framecast wire protocol: a fixed header, an event tag and a payload.

pub mod codec;
pub mod header;
pub mod message;

pub use codec::WireCodec;
pub use header::{HEADER_SIZE, MAX_PAYLOAD_SIZE, MAX_TAG_SIZE, WireFlags, WireHeader};
pub use message::{Hello, MessageKind, Reject, Welcome, WireMessage};
