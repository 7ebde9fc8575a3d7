//! Console rendering of `SinkEvent`s: rate-limited progress lines per task and
//! a tally of outcomes for the final summary.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use xfer_core::{SinkEvent, TaskSnapshot};

/// Minimum gap between two progress lines of the same task.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

#[derive(Debug, Default)]
pub struct ProgressPrinter {
    last_print: HashMap<String, Instant>,
    summary: Summary,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Line to print for `event`, or `None` if it is a progress update inside
    /// the per-task interval. Terminal events are always rendered.
    pub fn render(&mut self, event: &SinkEvent, now: Instant) -> Option<String> {
        match event {
            SinkEvent::Progress { id, fraction } => {
                let due = match self.last_print.get(id) {
                    Some(prev) => now.duration_since(*prev) >= PROGRESS_INTERVAL,
                    None => true,
                };
                if !due && *fraction < 1.0 {
                    return None;
                }
                self.last_print.insert(id.clone(), now);
                Some(format!("  {}: {:.1}%", id, fraction * 100.0))
            }
            SinkEvent::Completed { id } => {
                self.last_print.remove(id);
                self.summary.completed += 1;
                Some(format!("{}: completed", id))
            }
            SinkEvent::Cancelled { id } => {
                self.last_print.remove(id);
                self.summary.cancelled += 1;
                Some(format!("{}: cancelled", id))
            }
            SinkEvent::Failed { id, error } => {
                self.last_print.remove(id);
                self.summary.failed += 1;
                Some(format!("{}: failed: {}", id, error))
            }
        }
    }
}

/// One status row: id, state, percentage, MiB done/total, rate, ETA.
pub fn format_snapshot(s: &TaskSnapshot) -> String {
    let done_mib = s.bytes_transferred as f64 / 1_048_576.0;
    let total_mib = s.total_bytes as f64 / 1_048_576.0;
    let rate_kib = s.bytes_per_sec() / 1024.0;
    let eta = s
        .eta_secs()
        .map(|e| format!("{:.0}s", e))
        .unwrap_or_else(|| "?".to_string());
    let limit = if s.speed_limit_bytes_per_sec == 0 {
        "unlimited".to_string()
    } else {
        format!("{} B/s", s.speed_limit_bytes_per_sec)
    };
    format!(
        "{:<24} {:<10} {:>5.1}%  {:.2} / {:.2} MiB  {:.1} KiB/s  ETA {}  limit {}",
        s.id,
        s.state.to_string(),
        s.fraction() * 100.0,
        done_mib,
        total_mib,
        rate_kib,
        eta,
        limit
    )
}
