//! Progress reporting: the per-chunk gate and point-in-time snapshots.

use std::time::Duration;

use super::TaskState;

/// Decides which chunk boundaries produce an `on_progress` call.
///
/// Values are non-decreasing and strictly below 1.0; the final 1.0 is
/// reported by the task itself on completion.
#[derive(Debug, Clone)]
pub(crate) struct ProgressGate {
    step_bytes: u64,
    last_reported: Option<u64>,
}

impl ProgressGate {
    /// `step_bytes` = minimum bytes between reports; 0 reports every chunk.
    pub(crate) fn new(step_bytes: u64) -> Self {
        Self {
            step_bytes,
            last_reported: None,
        }
    }

    pub(crate) fn observe(&mut self, done: u64, total: u64) -> Option<f64> {
        if total == 0 || done >= total {
            return None;
        }
        if let Some(last) = self.last_reported {
            if done <= last || done - last < self.step_bytes {
                return None;
            }
        }
        self.last_reported = Some(done);
        Some(done as f64 / total as f64)
    }
}

/// Snapshot of one task's progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub state: TaskState,
    /// Bytes written to the destination so far.
    pub bytes_transferred: u64,
    /// Source size; 0 until the source is opened.
    pub total_bytes: u64,
    /// Current throttle (0 = unlimited).
    pub speed_limit_bytes_per_sec: u64,
    /// Time since the worker started.
    pub elapsed: Duration,
}

impl TaskSnapshot {
    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.state == TaskState::Completed { 1.0 } else { 0.0 };
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64).min(1.0)
    }

    /// Average rate in bytes per second (0 if no time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / secs
    }

    /// Estimated seconds remaining (None if the rate is still 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_transferred);
        if remaining == 0 && self.total_bytes > 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }
}
