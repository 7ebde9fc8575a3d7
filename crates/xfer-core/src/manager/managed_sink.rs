//! Sink wrapper that keeps manager bookkeeping in step with task lifecycles.
//!
//! On the first terminal callback it updates the manager (active set,
//! in-flight ids, completed set, worker slot) and only then forwards to the
//! caller's sink. Later terminal callbacks and any progress after a terminal
//! one are dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::Inner;
use crate::error::TransferError;
use crate::sink::ProgressSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    Completed,
    Cancelled,
    Errored,
}

pub(crate) struct ManagedSink {
    pub(crate) id: String,
    pub(crate) destination: String,
    manager: Weak<Inner>,
    user: Arc<dyn ProgressSink>,
    finished: AtomicBool,
    holds_slot: AtomicBool,
}

impl ManagedSink {
    pub(crate) fn new(
        id: String,
        destination: String,
        manager: Weak<Inner>,
        user: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            id,
            destination,
            manager,
            user,
            finished: AtomicBool::new(false),
            holds_slot: AtomicBool::new(false),
        }
    }

    /// Record that the task was dispatched onto a worker slot.
    pub(crate) fn mark_slot_held(&self) {
        self.holds_slot.store(true, Ordering::Release);
    }

    fn finish(&self, terminal: Terminal, forward: impl FnOnce(&dyn ProgressSink)) {
        if self.finished.swap(true, Ordering::AcqRel) {
            tracing::debug!(id = %self.id, ?terminal, "duplicate terminal callback dropped");
            return;
        }
        let manager = self.manager.upgrade();
        let released = self.holds_slot.swap(false, Ordering::AcqRel);
        if let Some(m) = &manager {
            m.on_terminal(self, terminal, released);
        }
        // The caller's sink runs outside our bookkeeping; a panic there must
        // not leave `finishing` raised.
        let user = self.user.as_ref();
        if panic::catch_unwind(AssertUnwindSafe(|| forward(user))).is_err() {
            tracing::error!(id = %self.id, ?terminal, "progress sink panicked in terminal callback");
        }
        if let Some(m) = &manager {
            m.after_terminal();
        }
    }
}

impl ProgressSink for ManagedSink {
    fn on_progress(&self, fraction: f64) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        self.user.on_progress(fraction);
    }

    fn on_error(&self, error: &TransferError) {
        self.finish(Terminal::Errored, |s| s.on_error(error));
    }

    fn on_cancelled(&self) {
        self.finish(Terminal::Cancelled, |s| s.on_cancelled());
    }

    fn on_completed(&self) {
        self.finish(Terminal::Completed, |s| s.on_completed());
    }
}
