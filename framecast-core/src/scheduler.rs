//! Streaming scheduler.
//!
//! Orchestrates the full pipeline:
//!
//! 1. [`CaptureHandle`] acquires raw frames at `target_fps`.
//! 2. [`FrameEncoder`] compresses each frame.
//! 3. [`FrameQueue`] buffers encoded frames, dropping the oldest when full.
//! 4. A consumer task hands frames to the [`TransportSession`].
//!
//! The producer never waits on the network: while the session is
//! reconnecting, frames keep flowing into the queue and the consumer's
//! sends fail fast. Device reads run on the blocking pool and race the
//! stop handle, so a stalled source cannot hold up shutdown. The scheduler stops on request, at end of stream,
//! on a capture failure, or when the session closes for good.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureDevice, CaptureHandle};
use crate::config::StreamConfig;
use crate::encoder::FrameEncoder;
use crate::error::StreamError;
use crate::frame::Frame;
use crate::queue::{EnqueueOutcome, FrameQueue};
use crate::state::ConnectionState;
use crate::stats::{SessionStats, StatsSnapshot};
use crate::transport::{SendOutcome, TransportSession};

// ── SessionReport ────────────────────────────────────────────────

/// Why a streaming run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The stop handle was cancelled.
    Requested,
    /// The capture device has no more frames.
    EndOfStream,
    /// The session gave up reconnecting.
    TransportClosed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("stop requested"),
            Self::EndOfStream => f.write_str("end of stream"),
            Self::TransportClosed => f.write_str("transport closed"),
        }
    }
}

/// Summary returned by [`StreamScheduler::run`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionReport {
    pub reason: StopReason,
    #[serde(skip)]
    pub final_state: ConnectionState,
    pub stats: StatsSnapshot,
}

// ── StreamScheduler ──────────────────────────────────────────────

/// Drives one streaming session from open to close.
///
/// # Lifetime
///
/// [`run`](Self::run) consumes the scheduler. Whatever way it ends, the
/// capture device is released exactly once and the session is closed.
pub struct StreamScheduler {
    config: Arc<StreamConfig>,
    device: Box<dyn CaptureDevice>,
    encoder: Box<dyn FrameEncoder>,
    session: Arc<TransportSession>,
    queue: Arc<FrameQueue>,
    stats: Arc<SessionStats>,
    stop: CancellationToken,
}

impl StreamScheduler {
    pub fn new(
        config: Arc<StreamConfig>,
        device: Box<dyn CaptureDevice>,
        encoder: Box<dyn FrameEncoder>,
        session: Arc<TransportSession>,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let stats = session.stats();
        let queue = Arc::new(FrameQueue::new(config.queue_capacity, Arc::clone(&stats)));
        Ok(Self {
            config,
            device,
            encoder,
            session,
            queue,
            stats,
            stop: CancellationToken::new(),
        })
    }

    /// A cloneable handle that stops the run from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Run until stopped, end of stream, or a fatal error.
    pub async fn run(self) -> Result<SessionReport, StreamError> {
        let Self {
            config,
            device,
            mut encoder,
            session,
            queue,
            stats,
            stop,
        } = self;

        let capture = match CaptureHandle::open(device) {
            Ok(capture) => capture,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        if let Err(e) = session.start() {
            session.close().await;
            capture.release();
            return Err(e);
        }

        if let Some(deadline) = config.transport.initial_connect_timeout {
            let connected = tokio::select! {
                _ = stop.cancelled() => None,
                result = session.wait_until_connected(deadline) => Some(result),
            };
            match connected {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    warn!("no connection to {} within {deadline:?}: {e}", session.target().endpoint);
                    session.close().await;
                    capture.release();
                    return Err(StreamError::InitialConnect(deadline));
                }
                None => {
                    session.close().await;
                    capture.release();
                    return Ok(build_report(StopReason::Requested, &session, &stats));
                }
            }
        }

        info!(
            "streaming {} at {} fps via {} (quality {}, {} payloads)",
            capture.describe(),
            config.target_fps,
            encoder.name(),
            config.quality,
            config.encoding
        );

        let finish = CancellationToken::new();
        let mut consumer = spawn_consumer(
            Arc::clone(&queue),
            Arc::clone(&session),
            Arc::clone(&stats),
            finish.clone(),
        );

        // ── Producer ─────────────────────────────────────────────
        let interval = config.frame_interval();
        let mut last_report = Instant::now();

        // Each read takes the handle onto the blocking pool and hands it
        // back with the result. A read still running when the loop ends
        // is kept in `pending`.
        let mut capture = Some(capture);
        let mut pending = None;

        let outcome: Result<StopReason, StreamError> = loop {
            if stop.is_cancelled() {
                break Ok(StopReason::Requested);
            }
            if session.state().is_closed() {
                break Ok(StopReason::TransportClosed);
            }
            let tick = Instant::now();

            let Some(mut handle) = capture.take() else {
                break Err(StreamError::Capture("capture handle lost".into()));
            };
            let mut read = tokio::task::spawn_blocking(move || {
                let result = handle.read_frame();
                (handle, result)
            });
            let joined = tokio::select! {
                biased;
                joined = &mut read => Some(joined),
                _ = stop.cancelled() => None,
                _ = session.wait_closed() => None,
            };
            let Some(joined) = joined else {
                pending = Some(read);
                break Ok(if stop.is_cancelled() {
                    StopReason::Requested
                } else {
                    StopReason::TransportClosed
                });
            };
            let result = match joined {
                Ok((handle, result)) => {
                    capture = Some(handle);
                    result
                }
                Err(e) => break Err(StreamError::Capture(format!("capture read aborted: {e}"))),
            };

            match result {
                Ok(Some(raw)) => {
                    stats.record_captured();
                    match encoder.encode(&raw, config.quality) {
                        Ok(payload) => {
                            stats.record_encoded();
                            let frame = Frame::new(payload, raw.captured_at, config.encoding);
                            if let EnqueueOutcome::DroppedOldest(id) = queue.enqueue(frame) {
                                debug!("queue full, dropped frame {id}");
                            }
                        }
                        Err(e) => {
                            stats.record_encode_failed();
                            warn!("skipping frame: {e}");
                        }
                    }
                }
                Ok(None) => break Ok(StopReason::EndOfStream),
                Err(e) => break Err(e),
            }

            if last_report.elapsed() >= config.stats_interval {
                info!("[{}] {}", session.state(), stats.snapshot());
                last_report = Instant::now();
            }

            let remaining = interval.saturating_sub(tick.elapsed());
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = session.wait_closed() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        };

        // ── Shutdown ─────────────────────────────────────────────
        // Capture has stopped producing; flush what is queued.
        finish.cancel();
        drain(&mut consumer, config.drain_timeout).await;
        let discarded = queue.clear();
        if discarded > 0 {
            debug!("discarded {discarded} queued frames on stop");
            stats.record_discarded(discarded);
        }
        session.close().await;
        if let Some(read) = pending {
            match tokio::time::timeout(interval, read).await {
                Ok(Ok((handle, _))) => capture = Some(handle),
                Ok(Err(e)) => warn!("capture read aborted: {e}"),
                Err(_) => debug!("capture read still pending; device closes when it returns"),
            }
        }
        if let Some(capture) = capture {
            capture.release();
        }

        match outcome {
            Ok(reason) => {
                let report = build_report(reason, &session, &stats);
                info!("stream ended ({reason}): {}", report.stats);
                Ok(report)
            }
            Err(e) => {
                warn!("stream aborted: {e}");
                Err(e)
            }
        }
    }
}

fn build_report(reason: StopReason, session: &TransportSession, stats: &SessionStats) -> SessionReport {
    SessionReport {
        reason,
        final_state: session.state(),
        stats: stats.snapshot(),
    }
}

/// Dequeue and send until told to finish (then flush) or the session closes.
fn spawn_consumer(
    queue: Arc<FrameQueue>,
    session: Arc<TransportSession>,
    stats: Arc<SessionStats>,
    finish: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                _ = session.wait_closed() => break,
                frame = queue.dequeue() => frame,
                _ = finish.cancelled() => match queue.try_dequeue() {
                    Some(frame) => frame,
                    None => break,
                },
            };
            match session.send(&frame).await {
                SendOutcome::Sent => stats.record_transmitted(frame.len()),
                SendOutcome::Failed => stats.record_transmit_failed(),
            }
        }
    })
}

/// Wait for the consumer to flush, aborting it after `timeout`.
async fn drain(consumer: &mut JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut *consumer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("consumer task failed: {e}"),
        Err(_) => {
            warn!("drain did not finish within {timeout:?}");
            consumer.abort();
        }
    }
}
