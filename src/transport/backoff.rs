//! Reconnect Backoff
//!
//! Capped exponential backoff with jitter for the reconnect loop. Attempts
//! are unbounded: a dropped link keeps retrying until explicit teardown.

use std::time::Duration;

use rand::Rng;

const JITTER_FRACTION: f64 = 0.1;

/// Backoff schedule for one reconnect episode.
///
/// Delays double from the initial value up to the cap, with +/-10% jitter
/// so a fleet of clients does not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.peek_delay();
        self.attempt = self.attempt.saturating_add(1);
        let jitter = 1.0 + rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        delay.mul_f64(jitter)
    }

    /// The raw (jitter-free) delay the next attempt would use.
    pub fn peek_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Attempts taken so far in this episode.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Restart the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
