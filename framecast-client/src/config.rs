//! Configuration for the streaming client.
//!
//! Durations are written in milliseconds (or seconds where noted) and
//! a zero stands for "unset" where the core setting is optional.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use framecast_core::{
    CaptureDevice, MAX_TARGET_FPS, PayloadEncoding, PixelFormat, RawInput, RawVideoSource,
    ReconnectPolicy, StreamConfig, StreamError, TestPatternSource, TransportHint,
    TransportSettings,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// What to stream and where.
    pub stream: StreamSection,
    /// Connection timeouts.
    pub transport: TransportSection,
    /// Reconnect backoff and limits.
    pub reconnect: ReconnectSection,
    /// Capture source.
    pub source: SourceSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Ingestion endpoint, `tcp://host:port`.
    pub endpoint: String,
    /// Namespace selected during the handshake.
    pub channel: String,
    /// Event tag frames are emitted under.
    pub event: String,
    /// Target frames per second.
    pub fps: u32,
    /// Compression quality, 1..=100.
    pub quality: u8,
    /// Payload framing: "binary" or "base64-json".
    pub encoding: PayloadEncoding,
    /// Frames buffered between encoder and network.
    pub queue_capacity: usize,
    /// Bound on flushing queued frames at shutdown.
    pub drain_timeout_ms: u64,
    /// Period of the statistics log line, in seconds.
    pub stats_interval_secs: u64,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Fail unless the first connection is up in time. 0 = wait forever.
    pub initial_connect_timeout_ms: u64,
    /// "low-latency" or "throughput".
    pub hint: TransportHint,
}

/// Reconnect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Random jitter as a fraction of the delay (0.0..=1.0).
    pub jitter: f64,
    /// 0 = retry forever.
    pub max_attempts: u32,
    /// 0 = retry forever.
    pub max_elapsed_secs: u64,
}

/// Kind of capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Synthetic moving gradient.
    TestPattern,
    /// Raw frames from a file or stdin.
    Raw,
}

/// Capture source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub kind: SourceKind,
    /// Raw input path; "-" reads stdin.
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Raw pixel format: rgb24, bgr24, rgba, bgra, gray.
    pub pixel_format: String,
    /// Stop after this many frames. 0 = endless (test pattern only).
    pub frames: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for StreamSection {
    fn default() -> Self {
        let core = StreamConfig::default();
        Self {
            endpoint: core.endpoint,
            channel: core.channel,
            event: core.event,
            fps: core.target_fps,
            quality: core.quality,
            encoding: PayloadEncoding::Binary,
            queue_capacity: core.queue_capacity,
            drain_timeout_ms: core.drain_timeout.as_millis() as u64,
            stats_interval_secs: core.stats_interval.as_secs(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        let core = TransportSettings::default();
        Self {
            connect_timeout_ms: core.connect_timeout.as_millis() as u64,
            send_timeout_ms: core.send_timeout.as_millis() as u64,
            heartbeat_interval_ms: core.heartbeat_interval.as_millis() as u64,
            initial_connect_timeout_ms: core
                .initial_connect_timeout
                .map_or(0, |d| d.as_millis() as u64),
            hint: core.hint,
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        let core = ReconnectPolicy::default();
        Self {
            initial_delay_ms: core.initial_delay.as_millis() as u64,
            max_delay_ms: core.max_delay.as_millis() as u64,
            multiplier: core.multiplier,
            jitter: core.jitter,
            max_attempts: 0,
            max_elapsed_secs: 0,
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKind::TestPattern,
            path: "-".into(),
            width: 640,
            height: 480,
            pixel_format: "rgb24".into(),
            frames: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Command-line overrides ───────────────────────────────────────

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub channel: Option<String>,
    pub fps: Option<u32>,
    pub quality: Option<u8>,
    pub encoding: Option<PayloadEncoding>,
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// `Ok(None)` when the file does not exist. A file that exists but
    /// cannot be read or parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Option<Self>, StreamError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StreamError::Configuration(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        toml::from_str(&contents).map(Some).map_err(|e| {
            StreamError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(endpoint) = overrides.endpoint {
            self.stream.endpoint = endpoint;
        }
        if let Some(channel) = overrides.channel {
            self.stream.channel = channel;
        }
        if let Some(fps) = overrides.fps {
            self.stream.fps = fps;
        }
        if let Some(quality) = overrides.quality {
            self.stream.quality = quality;
        }
        if let Some(encoding) = overrides.encoding {
            self.stream.encoding = encoding;
        }
    }

    /// Convert into the core session configuration and validate it.
    pub fn to_stream_config(&self) -> Result<Arc<StreamConfig>, StreamError> {
        let ms = Duration::from_millis;
        let optional_ms = |v: u64| (v > 0).then(|| Duration::from_millis(v));

        let config = StreamConfig {
            target_fps: self.stream.fps.clamp(1, MAX_TARGET_FPS),
            quality: self.stream.quality.clamp(1, 100),
            encoding: self.stream.encoding,
            endpoint: self.stream.endpoint.clone(),
            channel: self.stream.channel.clone(),
            event: self.stream.event.clone(),
            queue_capacity: self.stream.queue_capacity,
            transport: TransportSettings {
                connect_timeout: ms(self.transport.connect_timeout_ms),
                send_timeout: ms(self.transport.send_timeout_ms),
                heartbeat_interval: ms(self.transport.heartbeat_interval_ms),
                initial_connect_timeout: optional_ms(self.transport.initial_connect_timeout_ms),
                hint: self.transport.hint,
            },
            reconnect: ReconnectPolicy {
                initial_delay: ms(self.reconnect.initial_delay_ms),
                max_delay: ms(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
                jitter: self.reconnect.jitter,
                max_attempts: (self.reconnect.max_attempts > 0).then_some(self.reconnect.max_attempts),
                max_elapsed: (self.reconnect.max_elapsed_secs > 0)
                    .then(|| Duration::from_secs(self.reconnect.max_elapsed_secs)),
            },
            drain_timeout: ms(self.stream.drain_timeout_ms),
            stats_interval: Duration::from_secs(self.stream.stats_interval_secs.max(1)),
        };
        config.validate()?;
        Ok(Arc::new(config))
    }

    /// Build the configured capture device.
    pub fn build_source(&self) -> Result<Box<dyn CaptureDevice>, StreamError> {
        let src = &self.source;
        match src.kind {
            SourceKind::TestPattern => {
                let pattern = TestPatternSource::new(src.width, src.height);
                Ok(Box::new(if src.frames > 0 {
                    pattern.with_limit(src.frames)
                } else {
                    pattern
                }))
            }
            SourceKind::Raw => {
                let format = PixelFormat::from_name(&src.pixel_format).ok_or_else(|| {
                    StreamError::Configuration(format!(
                        "unknown pixel format {:?}",
                        src.pixel_format
                    ))
                })?;
                let input = match src.path.as_str() {
                    "-" | "" => RawInput::Stdin,
                    path => RawInput::File(PathBuf::from(path)),
                };
                Ok(Box::new(RawVideoSource::new(input, src.width, src.height, format)))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
