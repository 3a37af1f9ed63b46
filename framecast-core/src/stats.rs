//! Per-session counters.
//!
//! Monotonic for the lifetime of a session; shared between the
//! producer, the consumer and the queue through an `Arc`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters for one streaming session.
#[derive(Debug, Default)]
pub struct SessionStats {
    captured: AtomicU64,
    encoded: AtomicU64,
    encode_failed: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    transmitted: AtomicU64,
    transmit_failed: AtomicU64,
    discarded: AtomicU64,
    bytes_transmitted: AtomicU64,
    reconnects: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoded(&self) {
        self.encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_failed(&self) {
        self.encode_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A queued frame was evicted to admit a newer one.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transmitted(&self, bytes: usize) {
        self.transmitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_transmitted
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_transmit_failed(&self) {
        self.transmit_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames still queued when the session stopped.
    pub fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            encoded: self.encoded.load(Ordering::Relaxed),
            encode_failed: self.encode_failed.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
            transmit_failed: self.transmit_failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            bytes_transmitted: self.bytes_transmitted.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub encoded: u64,
    pub encode_failed: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub transmitted: u64,
    pub transmit_failed: u64,
    pub discarded: u64,
    pub bytes_transmitted: u64,
    pub reconnects: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captured={} encoded={} encode_failed={} enqueued={} dropped={} \
             transmitted={} transmit_failed={} discarded={} bytes={} reconnects={}",
            self.captured,
            self.encoded,
            self.encode_failed,
            self.enqueued,
            self.dropped,
            self.transmitted,
            self.transmit_failed,
            self.discarded,
            self.bytes_transmitted,
            self.reconnects,
        )
    }
}
