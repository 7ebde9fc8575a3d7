//! Shared pause/cancel/speed state between a task's worker and its handles.
//!
//! One mutex guards the state machine; one condition variable wakes the
//! worker for both the pause wait and the throttle sleep, so `cancel()` is
//! observed promptly in either.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::TaskState;

/// What the worker should do after a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Cancel,
}

#[derive(Debug)]
struct ControlState {
    state: TaskState,
    speed_limit: u64,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

#[derive(Debug)]
pub(crate) struct TaskShared {
    pub(crate) id: String,
    control: Mutex<ControlState>,
    wake: Condvar,
    bytes_transferred: AtomicU64,
    total_bytes: AtomicU64,
}

impl TaskShared {
    pub(crate) fn new(id: String, speed_limit: u64) -> Self {
        Self {
            id,
            control: Mutex::new(ControlState {
                state: TaskState::Waiting,
                speed_limit,
                started_at: None,
                finished_at: None,
            }),
            wake: Condvar::new(),
            bytes_transferred: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    // A panicking sink must not wedge the control plane for other callers.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn state(&self) -> TaskState {
        self.lock().state
    }

    pub(crate) fn speed_limit(&self) -> u64 {
        self.lock().speed_limit
    }

    pub(crate) fn set_speed_limit(&self, bytes_per_sec: u64) -> bool {
        let mut c = self.lock();
        if c.state.is_terminal() {
            return false;
        }
        c.speed_limit = bytes_per_sec;
        true
    }

    pub(crate) fn pause(&self) -> bool {
        let mut c = self.lock();
        if c.state != TaskState::Running {
            return false;
        }
        c.state = TaskState::Paused;
        true
    }

    pub(crate) fn resume(&self) -> bool {
        let mut c = self.lock();
        if c.state != TaskState::Paused {
            return false;
        }
        c.state = TaskState::Running;
        self.wake.notify_all();
        true
    }

    /// Request cancellation. The worker performs cleanup and fires the callback.
    pub(crate) fn cancel(&self) -> bool {
        let mut c = self.lock();
        if c.state.is_terminal() {
            return false;
        }
        c.state = TaskState::Cancelled;
        c.finished_at = Some(Instant::now());
        self.wake.notify_all();
        true
    }

    /// Waiting -> Running. Returns false if the task was cancelled before it started.
    pub(crate) fn begin(&self) -> bool {
        let mut c = self.lock();
        if c.state != TaskState::Waiting {
            return false;
        }
        c.state = TaskState::Running;
        c.started_at = Some(Instant::now());
        true
    }

    /// Move to a terminal state unless cancellation (or another terminal
    /// transition) got there first. Returns false in that case.
    pub(crate) fn finish(&self, terminal: TaskState) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut c = self.lock();
        if c.state.is_terminal() {
            return false;
        }
        c.state = terminal;
        c.finished_at = Some(Instant::now());
        true
    }

    /// Blocks while paused. Returns `Flow::Cancel` once cancellation is requested.
    pub(crate) fn checkpoint(&self) -> Flow {
        let mut c = self.lock();
        while c.state == TaskState::Paused {
            c = self.wake.wait(c).unwrap_or_else(|e| e.into_inner());
        }
        if c.state == TaskState::Cancelled {
            Flow::Cancel
        } else {
            Flow::Continue
        }
    }

    /// Sleeps for `dur` unless cancelled first.
    pub(crate) fn sleep(&self, dur: Duration) -> Flow {
        let deadline = Instant::now() + dur;
        let mut c = self.lock();
        loop {
            if c.state == TaskState::Cancelled {
                return Flow::Cancel;
            }
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }
            c = self
                .wake
                .wait_timeout(c, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.total_bytes.store(total, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes(&self, n: u64) -> u64 {
        self.bytes_transferred.fetch_add(n, Ordering::Relaxed) + n
    }

    pub(crate) fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Time spent since the worker started, frozen once the task ends.
    pub(crate) fn elapsed(&self) -> Duration {
        let c = self.lock();
        match (c.started_at, c.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}
