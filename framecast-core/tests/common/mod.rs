//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use framecast_core::{
    CaptureDevice, ChannelEvent, ChannelTarget, DuplexChannel, FrameEncoder, PixelFormat,
    RawFrame, StreamConfig, StreamError, WirePayload, ZstdEncoder,
};
use tokio::sync::mpsc;

// ── ScriptedChannel ──────────────────────────────────────────────

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connect {
    Accept,
    Refuse,
}

/// Counters a test keeps after handing the channel to a session.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    pub connects: AtomicUsize,
    pub sends: AtomicUsize,
    pub closes: AtomicUsize,
    /// Sends attempted after the session closed the channel for good.
    pub sends_after_close: AtomicUsize,
    pub payloads: Mutex<Vec<(String, WirePayload)>>,
}

impl ChannelCounters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory duplex channel following a connect script.
///
/// Once the script runs out every further connect is accepted unless
/// `refuse_forever` is set.
pub struct ScriptedChannel {
    script: VecDeque<Connect>,
    refuse_forever: bool,
    send_latency: Duration,
    /// Drop the link right after this many successful sends.
    disconnect_after: Option<usize>,
    link: Option<mpsc::Sender<ChannelEvent>>,
    counters: Arc<ChannelCounters>,
}

impl ScriptedChannel {
    pub fn new() -> (Self, Arc<ChannelCounters>) {
        let counters = Arc::new(ChannelCounters::default());
        let channel = Self {
            script: VecDeque::new(),
            refuse_forever: false,
            send_latency: Duration::ZERO,
            disconnect_after: None,
            link: None,
            counters: Arc::clone(&counters),
        };
        (channel, counters)
    }

    pub fn script(mut self, steps: &[Connect]) -> Self {
        self.script = steps.iter().copied().collect();
        self
    }

    pub fn refuse_forever(mut self) -> Self {
        self.refuse_forever = true;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.send_latency = latency;
        self
    }

    pub fn disconnect_after(mut self, sends: usize) -> Self {
        self.disconnect_after = Some(sends);
        self
    }
}

#[async_trait]
impl DuplexChannel for ScriptedChannel {
    async fn connect(
        &mut self,
        _target: &ChannelTarget,
    ) -> Result<mpsc::Receiver<ChannelEvent>, StreamError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.script.pop_front().unwrap_or(if self.refuse_forever {
            Connect::Refuse
        } else {
            Connect::Accept
        });
        match step {
            Connect::Refuse => Err(StreamError::Connection("connection refused".into())),
            Connect::Accept => {
                let (tx, rx) = mpsc::channel(8);
                self.link = Some(tx);
                Ok(rx)
            }
        }
    }

    async fn send(&mut self, tag: &str, payload: WirePayload) -> Result<(), StreamError> {
        if self.counters.closes() > 0 && self.link.is_none() {
            self.counters.sends_after_close.fetch_add(1, Ordering::SeqCst);
        }
        let Some(link) = self.link.clone() else {
            return Err(StreamError::Transmit("link down".into()));
        };
        if !self.send_latency.is_zero() {
            tokio::time::sleep(self.send_latency).await;
        }
        self.counters
            .payloads
            .lock()
            .unwrap()
            .push((tag.to_string(), payload));
        let sent = self.counters.sends.fetch_add(1, Ordering::SeqCst) + 1;

        if self.disconnect_after == Some(sent) {
            self.disconnect_after = None;
            self.link = None;
            let _ = link
                .send(ChannelEvent::Disconnected {
                    reason: "scripted link loss".into(),
                })
                .await;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.link = None;
    }
}

// ── FakeCamera ───────────────────────────────────────────────────

/// Counters a test keeps after handing the camera to a scheduler.
#[derive(Debug, Default)]
pub struct CameraCounters {
    pub opens: AtomicUsize,
    pub reads: AtomicUsize,
    pub closes: AtomicUsize,
}

impl CameraCounters {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Produces small gray frames; can end the stream or fail on cue.
pub struct FakeCamera {
    limit: Option<usize>,
    fail_at: Option<usize>,
    fail_open: bool,
    produced: usize,
    counters: Arc<CameraCounters>,
}

impl FakeCamera {
    pub fn new() -> (Self, Arc<CameraCounters>) {
        let counters = Arc::new(CameraCounters::default());
        let camera = Self {
            limit: None,
            fail_at: None,
            fail_open: false,
            produced: 0,
            counters: Arc::clone(&counters),
        };
        (camera, counters)
    }

    /// End of stream after `frames` frames.
    pub fn limit(mut self, frames: usize) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Capture error instead of frame number `index` (0-based).
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl CaptureDevice for FakeCamera {
    fn open(&mut self) -> Result<(), StreamError> {
        if self.fail_open {
            return Err(StreamError::Capture("camera unplugged".into()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(self.produced) {
            return Err(StreamError::Capture("sensor fault".into()));
        }
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        let shade = (self.produced % 256) as u8;
        self.produced += 1;
        Ok(Some(RawFrame {
            width: 4,
            height: 4,
            stride: 4,
            format: PixelFormat::Gray8,
            data: vec![shade; 16],
            captured_at: SystemTime::now(),
        }))
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "fake camera 4x4".into()
    }
}

/// Blocks inside `read_frame` until the returned sender is dropped,
/// then reports end of stream.
pub struct StalledCamera {
    gate: std::sync::mpsc::Receiver<()>,
    counters: Arc<CameraCounters>,
}

impl StalledCamera {
    pub fn new() -> (Self, Arc<CameraCounters>, std::sync::mpsc::Sender<()>) {
        let (release, gate) = std::sync::mpsc::channel();
        let counters = Arc::new(CameraCounters::default());
        let camera = Self {
            gate,
            counters: Arc::clone(&counters),
        };
        (camera, counters, release)
    }
}

impl CaptureDevice for StalledCamera {
    fn open(&mut self) -> Result<(), StreamError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let _ = self.gate.recv();
        Ok(None)
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "stalled pipe".into()
    }
}

// ── Encoders ─────────────────────────────────────────────────────

/// Zstd encoder that fails every `every`-th frame (1-based).
pub struct FlakyEncoder {
    every: usize,
    seen: usize,
    inner: ZstdEncoder,
}

impl FlakyEncoder {
    pub fn every(every: usize) -> Self {
        Self {
            every,
            seen: 0,
            inner: ZstdEncoder::new(),
        }
    }
}

impl FrameEncoder for FlakyEncoder {
    fn encode(&mut self, frame: &RawFrame, quality: u8) -> Result<Bytes, StreamError> {
        self.seen += 1;
        if self.seen % self.every == 0 {
            return Err(StreamError::Encode(format!("corrupt frame {}", self.seen)));
        }
        self.inner.encode(frame, quality)
    }

    fn name(&self) -> &'static str {
        "flaky-zstd"
    }
}

// ── Config ───────────────────────────────────────────────────────

/// Fast, deterministic configuration for paused-time tests.
pub fn test_config() -> StreamConfig {
    let mut config = StreamConfig {
        target_fps: 20,
        queue_capacity: 5,
        ..Default::default()
    };
    config.reconnect.initial_delay = Duration::from_millis(100);
    config.reconnect.max_delay = Duration::from_secs(2);
    config.reconnect.jitter = 0.0;
    config.stats_interval = Duration::from_secs(60);
    config
}
