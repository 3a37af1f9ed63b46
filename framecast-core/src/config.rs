//! Session configuration.
//!
//! [`StreamConfig`] is immutable for the lifetime of one streaming
//! session and validated once before anything is opened.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::StreamError;
use crate::wire::MAX_TAG_SIZE;

/// Highest frame rate the scheduler will pace at.
pub const MAX_TARGET_FPS: u32 = 240;

/// Event tag frames are emitted under unless configured otherwise.
pub const DEFAULT_EVENT: &str = "video-frame";

// ── PayloadEncoding ──────────────────────────────────────────────

/// How a compressed frame is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadEncoding {
    /// The compressed bytes, unchanged.
    #[default]
    Binary,
    /// `{"id": "<uuid>", "frame": "<base64>"}`.
    Base64Json,
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Base64Json => f.write_str("base64-json"),
        }
    }
}

impl FromStr for PayloadEncoding {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "base64-json" | "base64" | "json" => Ok(Self::Base64Json),
            other => Err(StreamError::Configuration(format!(
                "unknown payload encoding {other:?} (expected binary or base64-json)"
            ))),
        }
    }
}

// ── TransportHint ────────────────────────────────────────────────

/// Transport preference passed to the channel on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportHint {
    /// Flush every frame immediately (`TCP_NODELAY`).
    #[default]
    LowLatency,
    /// Let the kernel coalesce small writes.
    Throughput,
}

// ── Endpoint ─────────────────────────────────────────────────────

/// A validated `host:port` ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse `tcp://host:port` or a bare `host:port`.
    pub fn parse(raw: &str) -> Result<Self, StreamError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StreamError::Configuration("endpoint is empty".into()));
        }
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("tcp://{raw}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| StreamError::Configuration(format!("malformed endpoint {raw:?}: {e}")))?;

        if url.scheme() != "tcp" {
            return Err(StreamError::Configuration(format!(
                "unsupported endpoint scheme {:?} (expected tcp)",
                url.scheme()
            )));
        }
        if !matches!(url.path(), "" | "/") || url.query().is_some() {
            return Err(StreamError::Configuration(format!(
                "endpoint {raw:?} must not carry a path or query; use the channel setting"
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| StreamError::Configuration(format!("endpoint {raw:?} has no host")))?;
        let port = url
            .port()
            .ok_or_else(|| StreamError::Configuration(format!("endpoint {raw:?} has no port")))?;

        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ── TransportSettings ────────────────────────────────────────────

/// Timeouts and preferences for the transport session.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Deadline for one connect + handshake attempt.
    pub connect_timeout: Duration,
    /// Deadline for transmitting one frame.
    pub send_timeout: Duration,
    /// Keep-alive period on an idle link.
    pub heartbeat_interval: Duration,
    /// When set, the scheduler fails the session unless the first
    /// connection is up within this deadline.
    pub initial_connect_timeout: Option<Duration>,
    pub hint: TransportHint,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            initial_connect_timeout: Some(Duration::from_secs(10)),
            hint: TransportHint::LowLatency,
        }
    }
}

// ── ReconnectPolicy ──────────────────────────────────────────────

/// Backoff shape and retry limits for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Fraction (0.0..=1.0) of the base delay added as random jitter.
    pub jitter: f64,
    /// Give up after this many failed attempts. `None` = unbounded.
    pub max_attempts: Option<u32>,
    /// Give up after reconnecting for this long. `None` = unbounded.
    pub max_elapsed: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
            max_elapsed: None,
        }
    }
}

impl ReconnectPolicy {
    /// Whether the bounded-deployment limits have been reached.
    pub fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.max_elapsed.is_some_and(|max| elapsed >= max)
    }
}

// ── StreamConfig ─────────────────────────────────────────────────

/// Configuration for one streaming session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Capture cadence in frames per second (advisory).
    pub target_fps: u32,
    /// Compression quality, 1..=100.
    pub quality: u8,
    pub encoding: PayloadEncoding,
    /// Ingestion endpoint, `tcp://host:port`.
    pub endpoint: String,
    /// Logical sub-channel / namespace selected during the handshake.
    pub channel: String,
    /// Event tag every frame is emitted under.
    pub event: String,
    /// Maximum number of frames buffered between encoder and network.
    pub queue_capacity: usize,
    pub transport: TransportSettings,
    pub reconnect: ReconnectPolicy,
    /// Upper bound on flushing queued frames when the session stops.
    pub drain_timeout: Duration,
    /// Period of the statistics log line.
    pub stats_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_fps: 20,
            quality: 80,
            encoding: PayloadEncoding::Binary,
            endpoint: "tcp://127.0.0.1:7340".into(),
            channel: "/videostream".into(),
            event: DEFAULT_EVENT.into(),
            queue_capacity: 8,
            transport: TransportSettings::default(),
            reconnect: ReconnectPolicy::default(),
            drain_timeout: Duration::from_secs(1),
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl StreamConfig {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<Endpoint, StreamError> {
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(StreamError::Configuration(format!(
                "target_fps must be in 1..={MAX_TARGET_FPS}, got {}",
                self.target_fps
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(StreamError::Configuration(format!(
                "quality must be in 1..=100, got {}",
                self.quality
            )));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::Configuration("queue_capacity must be at least 1".into()));
        }
        if self.channel.trim().is_empty() {
            return Err(StreamError::Configuration("channel must not be empty".into()));
        }
        if self.event.trim().is_empty() {
            return Err(StreamError::Configuration("event tag must not be empty".into()));
        }
        if self.event.len() > MAX_TAG_SIZE {
            return Err(StreamError::Configuration(format!(
                "event tag is {} bytes, the wire limit is {MAX_TAG_SIZE}",
                self.event.len()
            )));
        }
        if self.transport.connect_timeout.is_zero() || self.transport.send_timeout.is_zero() {
            return Err(StreamError::Configuration("transport timeouts must be non-zero".into()));
        }
        let rc = &self.reconnect;
        if rc.initial_delay > rc.max_delay {
            return Err(StreamError::Configuration(
                "reconnect initial_delay exceeds max_delay".into(),
            ));
        }
        if rc.multiplier < 1.0 || !rc.multiplier.is_finite() {
            return Err(StreamError::Configuration(
                "reconnect multiplier must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&rc.jitter) {
            return Err(StreamError::Configuration(
                "reconnect jitter must be within 0.0..=1.0".into(),
            ));
        }
        Endpoint::parse(&self.endpoint)
    }

    /// Interval between two capture ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

// ── Tests ────────────────────────────────────────────────────────
