//! Bounded drop-oldest frame queue.
//!
//! Decouples the capture/encode cadence from the network cadence.
//! Enqueue never blocks: when the queue is full the oldest frame is
//! evicted to admit the newest, favouring freshness for live view.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::frame::Frame;
use crate::stats::SessionStats;

/// Result of [`FrameQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Admitted without evicting anything.
    Accepted,
    /// Admitted after evicting the oldest queued frame (its id).
    DroppedOldest(Uuid),
}

/// Bounded FIFO shared by one producer and one consumer.
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    available: Notify,
    stats: Arc<SessionStats>,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize, stats: Arc<SessionStats>) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            stats,
        }
    }

    /// Add a frame, evicting exactly one oldest frame when full.
    pub fn enqueue(&self, frame: Frame) -> EnqueueOutcome {
        let outcome = {
            let mut frames = self.lock();
            let outcome = if frames.len() >= self.capacity {
                match frames.pop_front() {
                    Some(evicted) => EnqueueOutcome::DroppedOldest(evicted.id),
                    None => EnqueueOutcome::Accepted,
                }
            } else {
                EnqueueOutcome::Accepted
            };
            frames.push_back(frame);
            outcome
        };

        self.stats.record_enqueued();
        if matches!(outcome, EnqueueOutcome::DroppedOldest(_)) {
            self.stats.record_dropped();
        }
        self.available.notify_one();
        outcome
    }

    /// Take the oldest frame, or `None` when empty.
    pub fn try_dequeue(&self) -> Option<Frame> {
        self.lock().pop_front()
    }

    /// Wait until a frame is available.
    ///
    /// Cancel-safe: dropping the future never loses a frame.
    pub async fn dequeue(&self) -> Frame {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.try_dequeue() {
                return frame;
            }
            notified.await;
        }
    }

    /// Bounded form of [`dequeue`](Self::dequeue).
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.dequeue()).await.ok()
    }

    /// Discard every queued frame, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut frames = self.lock();
        let n = frames.len();
        frames.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        // A panic while holding the lock cannot leave a VecDeque torn.
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ────────────────────────────────────────────────────────
