//! Exponential reconnect backoff with jitter.
//!
//! Delays grow by `multiplier` from `initial_delay` up to `max_delay`.
//! Jitter is added on top of the exponential base, and every delay is
//! clamped to `[previous delay, max_delay]` so consecutive delays never
//! shrink while the session keeps failing.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectPolicy;

/// Stateful delay generator for one reconnect cycle.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    /// Delay to wait before the next connect attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.policy.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.policy.jitter)
        } else {
            0.0
        };
        self.next_delay_with(jitter)
    }

    /// Deterministic variant: `jitter_fraction` of the base is added.
    pub fn next_delay_with(&mut self, jitter_fraction: f64) -> Duration {
        let cap = self.policy.max_delay;
        let base = self.base_delay();
        let jittered = base.mul_f64(1.0 + jitter_fraction.clamp(0.0, 1.0));

        let delay = jittered.min(cap).max(self.last).min(cap);
        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// Start over after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn base_delay(&self) -> Duration {
        let factor = self.policy.multiplier.max(1.0).powi(self.attempt.min(64) as i32);
        let secs = self.policy.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.policy.max_delay.as_secs_f64() {
            self.policy.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
