//! One-second throttle window.
//!
//! Counts bytes written in the current window; once the window's budget is
//! used up the caller sleeps for the rest of the second and starts a new one.

use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct ThrottleWindow {
    started: Instant,
    bytes: u64,
}

impl ThrottleWindow {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            started: now,
            bytes: 0,
        }
    }

    pub(crate) fn reset(&mut self, now: Instant) {
        self.started = now;
        self.bytes = 0;
    }

    /// Record `n` bytes written at `now` under a limit of `limit` bytes/sec
    /// (0 = unlimited). Returns how long to sleep before the next write, if at all.
    /// After sleeping the caller must `reset` the window.
    pub(crate) fn record(&mut self, n: u64, limit: u64, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= WINDOW {
            self.reset(now);
        }
        self.bytes = self.bytes.saturating_add(n);
        if limit == 0 || self.bytes < limit {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.started);
        match WINDOW.checked_sub(elapsed) {
            Some(rest) if !rest.is_zero() => Some(rest),
            _ => {
                self.reset(now);
                None
            }
        }
    }
}
