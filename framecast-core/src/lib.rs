//! # framecast-core
//!
//! Real-time frame streaming pipeline.
//!
//! This crate contains:
//! - **Frames**: `RawFrame`, `Frame`, `WirePayload`, `PixelFormat`
//! - **Capture**: `CaptureDevice` trait, `TestPatternSource`, `RawVideoSource`
//! - **Encoder**: `FrameEncoder` trait, `ZstdEncoder`
//! - **Queue**: `FrameQueue`, bounded and drop-oldest
//! - **Transport**: `DuplexChannel` trait, `TcpChannel`, `TransportSession`
//! - **Wire**: `WireCodec` for framed TCP I/O via `tokio_util`
//! - **State**: `ConnectionState` machine with validated transitions
//! - **Scheduler**: `StreamScheduler` tying the stages together
//! - **Error**: `StreamError`, a typed `thiserror`-based error

pub mod backoff;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use backoff::Backoff;
pub use capture::{CaptureDevice, CaptureHandle, RawInput, RawVideoSource, TestPatternSource};
pub use config::{
    DEFAULT_EVENT, Endpoint, MAX_TARGET_FPS, PayloadEncoding, ReconnectPolicy, StreamConfig,
    TransportHint, TransportSettings,
};
pub use encoder::{FrameEncoder, ZstdEncoder};
pub use error::StreamError;
pub use frame::{Frame, PixelFormat, RawFrame, WirePayload};
pub use queue::{EnqueueOutcome, FrameQueue};
pub use scheduler::{SessionReport, StopReason, StreamScheduler};
pub use state::{ConnectionState, StateTransition};
pub use stats::{SessionStats, StatsSnapshot};
pub use transport::{
    ChannelEvent, ChannelTarget, DuplexChannel, SendOutcome, TcpChannel, TransportSession,
};
pub use wire::WireCodec;
