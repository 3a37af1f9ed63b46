//! Transport session: one logical connection that survives link churn.
//!
//! The session owns a [`DuplexChannel`] and a supervisor task that
//! connects, watches the link and reconnects with backoff. Callers only
//! see [`TransportSession::send`], which either hands one frame to a
//! live link or fails immediately.
//!
//! Every state change goes through the watch channel's write lock, and
//! the matching [`StateTransition`] is broadcast while that lock is
//! held, so observers see transitions in the order they were applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::frame::Frame;
use crate::state::{ConnectionState, StateTransition};
use crate::stats::SessionStats;
use crate::transport::channel::{ChannelEvent, ChannelTarget, DuplexChannel};

/// Depth of the transition broadcast; slow observers lag, never block.
const TRANSITION_BUFFER: usize = 256;

/// Result of handing one frame to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not connected, timed out or the link failed. The frame is gone.
    Failed,
}

/// Why the supervisor stopped watching a live link.
enum LinkEnd {
    Lost(String),
    Stopped,
}

pub struct TransportSession {
    config: Arc<StreamConfig>,
    target: ChannelTarget,
    channel: Mutex<Box<dyn DuplexChannel>>,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StateTransition>,
    /// Connect attempts since the last successful handshake.
    attempts: AtomicU32,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    /// Validate `config` and wrap `channel`. Nothing connects until
    /// [`start`](Self::start).
    pub fn new(
        config: Arc<StreamConfig>,
        channel: Box<dyn DuplexChannel>,
    ) -> Result<Arc<Self>, StreamError> {
        Self::with_stats(config, channel, Arc::new(SessionStats::new()))
    }

    /// Like [`new`](Self::new), counting reconnects into `stats`.
    pub fn with_stats(
        config: Arc<StreamConfig>,
        channel: Box<dyn DuplexChannel>,
        stats: Arc<SessionStats>,
    ) -> Result<Arc<Self>, StreamError> {
        let endpoint = config.validate()?;
        let target = ChannelTarget {
            endpoint,
            channel: config.channel.clone(),
            hint: config.transport.hint,
        };
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);

        Ok(Arc::new(Self {
            config,
            target,
            channel: Mutex::new(channel),
            state,
            transitions,
            attempts: AtomicU32::new(0),
            stats,
            cancel: CancellationToken::new(),
            supervisor: std::sync::Mutex::new(None),
        }))
    }

    // ── Observers ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Every transition applied from now on.
    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    pub fn target(&self) -> &ChannelTarget {
        &self.target
    }

    /// Counters shared with the scheduler.
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Wait until the link is up (`Connected` or `Streaming`).
    ///
    /// Fails with [`StreamError::Timeout`] after `timeout`, or with
    /// [`StreamError::Connection`] if the session closes first.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), StreamError> {
        let mut rx = self.subscribe();
        let wait = rx.wait_for(|s| s.is_sendable() || s.is_closed());
        match tokio::time::timeout(timeout, wait).await {
            Err(_) => Err(StreamError::Timeout(timeout)),
            Ok(Err(_)) => Err(StreamError::ChannelClosed),
            Ok(Ok(state)) if state.is_closed() => {
                Err(StreamError::Connection("session closed before connecting".into()))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Resolve once the session reached `Closed`.
    pub async fn wait_closed(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| s.is_closed()).await;
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Begin connecting in the background.
    pub fn start(self: &Arc<Self>) -> Result<(), StreamError> {
        self.transition(ConnectionState::Connecting)?;
        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.supervise().await });
        *self.supervisor_slot() = Some(handle);
        Ok(())
    }

    /// Stop reconnecting, close the link and enter `Closed`.
    ///
    /// Idempotent: only the first call touches the channel.
    pub async fn close(&self) {
        self.cancel.cancel();
        let first = self.transition(ConnectionState::Closed).is_ok();

        let supervisor = self.supervisor_slot().take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
        if first {
            self.channel.lock().await.close().await;
            info!("session to {} closed", self.target.endpoint);
        }
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Make exactly one attempt to transmit `frame`.
    ///
    /// Returns [`SendOutcome::Failed`] immediately when the link is not
    /// up, without waiting or touching the state. A failed or timed-out
    /// attempt moves the session to `Reconnecting`.
    pub async fn send(&self, frame: &Frame) -> SendOutcome {
        if !self.state().is_sendable() {
            return SendOutcome::Failed;
        }
        let payload = match frame.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("frame {} could not be framed: {e}", frame.id);
                return SendOutcome::Failed;
            }
        };

        let timeout = self.config.transport.send_timeout;
        let attempt = async {
            let mut channel = self.channel.lock().await;
            channel.send(&self.config.event, payload).await
        };
        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                self.transition_if(
                    |s| s == ConnectionState::Connected,
                    ConnectionState::Streaming,
                );
                SendOutcome::Sent
            }
            // The channel refused this frame before writing anything; the
            // link is still good.
            Err(e @ (StreamError::Protocol(_) | StreamError::Serialization(_))) => {
                warn!("frame {} not sent: {e}", frame.id);
                SendOutcome::Failed
            }
            Err(e) => {
                warn!("send of frame {} failed: {e}", frame.id);
                self.transition_if(|s| s.is_sendable(), ConnectionState::Reconnecting);
                SendOutcome::Failed
            }
        }
    }

    // ── State machine ────────────────────────────────────────────

    fn transition(&self, to: ConnectionState) -> Result<ConnectionState, StreamError> {
        self.transition_if(|_| true, to)
            .ok_or_else(|| StreamError::InvalidTransition {
                from: self.state(),
                to,
            })
    }

    /// Apply `current → to` when `guard(current)` holds and the move is
    /// legal. Returns the previous state on success.
    fn transition_if(
        &self,
        guard: impl Fn(ConnectionState) -> bool,
        to: ConnectionState,
    ) -> Option<ConnectionState> {
        let attempt = self.attempts.load(Ordering::SeqCst);
        let mut applied = None;
        self.state.send_if_modified(|state| {
            if !guard(*state) {
                return false;
            }
            match state.transition(to) {
                Ok(from) => {
                    debug!("session {from} -> {to} (attempt {attempt})");
                    let _ = self.transitions.send(StateTransition { from, to, attempt });
                    applied = Some(from);
                    true
                }
                Err(_) => false,
            }
        });
        applied
    }

    fn supervisor_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Supervisor ───────────────────────────────────────────────

    async fn supervise(self: Arc<Self>) {
        let policy = self.config.reconnect.clone();
        let connect_timeout = self.config.transport.connect_timeout;
        let mut backoff = Backoff::new(policy.clone());
        let mut retrying_since: Option<Instant> = None;

        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("connect attempt {attempt} to {}", self.target.endpoint);

            let connect = async {
                let mut channel = self.channel.lock().await;
                match tokio::time::timeout(connect_timeout, channel.connect(&self.target)).await {
                    Ok(result) => result,
                    Err(_) => Err(StreamError::Timeout(connect_timeout)),
                }
            };
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = connect => result,
            };

            match result {
                Ok(mut events) => {
                    if self.transition(ConnectionState::Connected).is_err() {
                        return;
                    }
                    self.attempts.store(0, Ordering::SeqCst);
                    backoff.reset();
                    retrying_since = None;
                    info!("streaming link to {} up", self.target.endpoint);

                    match self.watch_link(&mut events).await {
                        LinkEnd::Stopped => return,
                        LinkEnd::Lost(reason) => warn!("link to {} lost: {reason}", self.target.endpoint),
                    }
                    self.transition_if(|s| s.is_sendable(), ConnectionState::Reconnecting);
                    if self.state() != ConnectionState::Reconnecting {
                        return;
                    }
                    self.channel.lock().await.close().await;
                }
                Err(StreamError::Configuration(reason)) => {
                    warn!("channel refused configuration: {reason}");
                    let _ = self.transition(ConnectionState::Closed);
                    return;
                }
                Err(e) => {
                    warn!("connect attempt {attempt} to {} failed: {e}", self.target.endpoint);
                    if self.transition(ConnectionState::Reconnecting).is_err() {
                        return;
                    }
                }
            }

            let since = *retrying_since.get_or_insert_with(Instant::now);
            let failed = self.attempts.load(Ordering::SeqCst);
            if policy.is_exhausted(failed, since.elapsed()) {
                warn!(
                    "giving up on {} after {failed} attempts in {:?}",
                    self.target.endpoint,
                    since.elapsed()
                );
                let _ = self.transition(ConnectionState::Closed);
                return;
            }

            let delay = backoff.next_delay();
            self.stats.record_reconnect();
            debug!("reconnecting in {delay:?}");
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if self.transition(ConnectionState::Connecting).is_err() {
                return;
            }
        }
    }

    /// Block until the current link is lost or the session stops.
    async fn watch_link(&self, events: &mut mpsc::Receiver<ChannelEvent>) -> LinkEnd {
        let mut state_rx = self.subscribe();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return LinkEnd::Stopped,
                event = events.recv() => match event {
                    None => return LinkEnd::Lost("event stream ended".into()),
                    Some(ChannelEvent::Disconnected { reason }) => return LinkEnd::Lost(reason),
                    Some(ChannelEvent::Message { tag, payload }) => {
                        debug!("server event {tag:?} ({} bytes)", payload.len());
                    }
                },
                changed = state_rx.wait_for(|s| !s.is_sendable()) => {
                    let state = changed.map(|s| *s).unwrap_or(ConnectionState::Closed);
                    return match state {
                        ConnectionState::Reconnecting => LinkEnd::Lost("send failed".into()),
                        _ => LinkEnd::Stopped,
                    };
                }
            }
        }
    }
}
