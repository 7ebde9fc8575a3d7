//! A single background copy from a source locator to a destination locator.
//!
//! State machine:
//!
//! ```text
//! Waiting --start--> Running
//! Running --pause--> Paused --resume--> Running
//! Waiting|Running|Paused --cancel--> Cancelled
//! Running --end of input--> Completed
//! Running|Paused --I/O failure--> Errored
//! ```
//!
//! Completed, Cancelled and Errored are terminal; control calls on a terminal
//! task are no-ops. Cancellation deletes the partial destination, an error
//! leaves it in place.

mod control;
mod progress;
mod run;
mod throttle;

pub use progress::TaskSnapshot;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::sink::ProgressSink;
use crate::storage::Storage;
use control::TaskShared;

/// Default read/write chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default throttle: 200 KiB/s.
pub const DEFAULT_SPEED_LIMIT: u64 = 200 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Waiting,
    Running,
    Paused,
    Cancelled,
    Completed,
    Errored,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Completed | TaskState::Errored
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Waiting => "waiting",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Cancelled => "cancelled",
            TaskState::Completed => "completed",
            TaskState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Per-task tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Bytes read and written per iteration.
    pub chunk_size: usize,
    /// Initial throttle in bytes per second (0 = unlimited).
    pub speed_limit_bytes_per_sec: u64,
    /// Minimum bytes between progress callbacks (0 = every chunk).
    pub progress_step_bytes: u64,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            speed_limit_bytes_per_sec: DEFAULT_SPEED_LIMIT,
            progress_step_bytes: 0,
        }
    }
}

/// Cloneable control handle for a task. Safe to use from any thread.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// Running -> Paused. Returns false (no-op) in any other state.
    pub fn pause(&self) -> bool {
        let changed = self.shared.pause();
        if changed {
            tracing::debug!(id = %self.shared.id, "paused");
        }
        changed
    }

    /// Paused -> Running, waking the worker. Returns false (no-op) otherwise.
    pub fn resume(&self) -> bool {
        let changed = self.shared.resume();
        if changed {
            tracing::debug!(id = %self.shared.id, "resumed");
        }
        changed
    }

    /// Request cancellation from any non-terminal state. Wakes a paused or
    /// throttled worker. Returns false if the task already ended.
    pub fn cancel(&self) -> bool {
        let changed = self.shared.cancel();
        if changed {
            tracing::debug!(id = %self.shared.id, "cancel requested");
        }
        changed
    }

    /// Change the throttle; applies from the next throttle check. 0 = unlimited.
    pub fn set_speed(&self, bytes_per_sec: u64) -> bool {
        self.shared.set_speed_limit(bytes_per_sec)
    }

    pub fn speed(&self) -> u64 {
        self.shared.speed_limit()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.shared.id.clone(),
            state: self.shared.state(),
            bytes_transferred: self.shared.bytes_transferred(),
            total_bytes: self.shared.total_bytes(),
            speed_limit_bytes_per_sec: self.shared.speed_limit(),
            elapsed: self.shared.elapsed(),
        }
    }
}

/// One source -> destination copy, created in `Waiting`.
pub struct TransferTask {
    shared: Arc<TaskShared>,
    source: String,
    destination: String,
    storage: Arc<dyn Storage>,
    sink: Arc<dyn ProgressSink>,
    options: TaskOptions,
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("id", &self.shared.id)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl TransferTask {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        storage: Arc<dyn Storage>,
        sink: Arc<dyn ProgressSink>,
        options: TaskOptions,
    ) -> Self {
        Self {
            shared: Arc::new(TaskShared::new(
                id.into(),
                options.speed_limit_bytes_per_sec,
            )),
            source: source.into(),
            destination: destination.into(),
            storage,
            sink,
            options,
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the task on a dedicated worker thread.
    ///
    /// If the thread cannot be spawned, or the worker panics before reaching a
    /// terminal state, the task moves to `Errored` and the sink receives
    /// `TransferError::Interrupted`. A spawn error is also returned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<TaskState>> {
        let shared = Arc::clone(&self.shared);
        let sink = Arc::clone(&self.sink);
        let name = thread_name(&self.shared.id);
        let worker = {
            let shared = Arc::clone(&shared);
            let sink = Arc::clone(&sink);
            move || match panic::catch_unwind(AssertUnwindSafe(move || self.run())) {
                Ok(state) => state,
                Err(payload) => {
                    let reason = format!("worker panicked: {}", panic_reason(payload.as_ref()));
                    tracing::error!(id = %shared.id, "{}", reason);
                    interrupted(&shared, sink.as_ref(), reason)
                }
            }
        };
        match std::thread::Builder::new().name(name).spawn(worker) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                interrupted(&shared, sink.as_ref(), format!("could not start worker: {}", e));
                Err(e)
            }
        }
    }

    /// Drop a task that never started: marks it Cancelled and fires `on_cancelled`.
    /// Nothing on disk is touched.
    pub fn cancel_unstarted(self) {
        self.shared.cancel();
        tracing::info!(id = %self.shared.id, "cancelled before start");
        self.sink.on_cancelled();
    }
}

/// Thread names may not contain NUL; ids are caller-chosen strings.
fn thread_name(id: &str) -> String {
    let clean: String = id.chars().filter(|c| *c != '\0').collect();
    format!("xfer-{}", clean)
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Settle a task whose worker never ran or died early. A cancel request still
/// wins; a task that already reached a terminal state is left alone.
fn interrupted(shared: &TaskShared, sink: &dyn ProgressSink, reason: String) -> TaskState {
    if shared.finish(TaskState::Errored) {
        sink.on_error(&TransferError::Interrupted(reason));
        return TaskState::Errored;
    }
    let state = shared.state();
    if state == TaskState::Cancelled {
        sink.on_cancelled();
    }
    state
}
