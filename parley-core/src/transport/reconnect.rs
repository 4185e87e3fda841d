//! Reconnection scheduling as an explicit state machine.
//!
//! Kept separate from the socket actor so the backoff arithmetic and the
//! attempt bound can be unit tested without a network.

use std::time::Duration;

#[derive(Debug)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    attempt: u32,
    enabled: bool,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempt: 0,
            enabled: true,
        }
    }

    /// A successful open resets the budget: a later drop gets the full
    /// attempt count again.
    pub fn record_open(&mut self) {
        self.attempt = 0;
    }

    /// Asks for the next backoff delay, consuming one attempt.
    ///
    /// Linear backoff: attempt n waits `n × base_delay`. Returns `None`
    /// once disabled or the attempt budget is spent; the caller treats
    /// that as terminal.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.enabled || self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.base_delay * self.attempt)
    }

    /// Deliberate disconnect: no further retries, including any already
    /// scheduled.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempt
    }
}
