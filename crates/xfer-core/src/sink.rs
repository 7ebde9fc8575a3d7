//! Progress sinks: the caller-supplied receiver of task notifications.
//!
//! For every task exactly one of `on_error`, `on_cancelled`, `on_completed`
//! fires, once, and no `on_progress` follows it. Progress values are in
//! `[0.0, 1.0]`, non-decreasing, and 1.0 is reported once, just before
//! `on_completed`.
//!
//! Sinks are called from the task's worker thread; implementations must not
//! block for long or they stall the copy loop.

use crate::error::TransferError;
use std::sync::Arc;

/// Receiver of progress and terminal notifications for one task.
pub trait ProgressSink: Send + Sync + 'static {
    fn on_progress(&self, fraction: f64);
    fn on_error(&self, error: &TransferError);
    fn on_cancelled(&self);
    fn on_completed(&self);
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
    fn on_progress(&self, fraction: f64) {
        (**self).on_progress(fraction)
    }

    fn on_error(&self, error: &TransferError) {
        (**self).on_error(error)
    }

    fn on_cancelled(&self) {
        (**self).on_cancelled()
    }

    fn on_completed(&self) {
        (**self).on_completed()
    }
}

/// Reports through `tracing`. Progress is logged at trace level.
#[derive(Debug, Clone)]
pub struct LogSink {
    id: String,
}

impl LogSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ProgressSink for LogSink {
    fn on_progress(&self, fraction: f64) {
        tracing::trace!(id = %self.id, "progress {:.2}%", fraction * 100.0);
    }

    fn on_error(&self, error: &TransferError) {
        tracing::error!(id = %self.id, kind = error.kind(), "transfer failed: {}", error);
    }

    fn on_cancelled(&self) {
        tracing::info!(id = %self.id, "transfer cancelled");
    }

    fn on_completed(&self) {
        tracing::info!(id = %self.id, "transfer completed");
    }
}

/// Notification forwarded by `ChannelSink`, tagged with the task id.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Progress { id: String, fraction: f64 },
    Failed { id: String, error: String },
    Cancelled { id: String },
    Completed { id: String },
}

impl SinkEvent {
    pub fn id(&self) -> &str {
        match self {
            SinkEvent::Progress { id, .. }
            | SinkEvent::Failed { id, .. }
            | SinkEvent::Cancelled { id }
            | SinkEvent::Completed { id } => id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SinkEvent::Progress { .. })
    }
}

/// Forwards events into an unbounded tokio channel so an async consumer
/// (e.g. the CLI printer) can observe many tasks from one receiver.
/// Sending never blocks the worker; a closed receiver drops events.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    id: String,
    tx: tokio::sync::mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(id: impl Into<String>, tx: tokio::sync::mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self { id: id.into(), tx }
    }

    fn send(&self, event: SinkEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, fraction: f64) {
        self.send(SinkEvent::Progress {
            id: self.id.clone(),
            fraction,
        });
    }

    fn on_error(&self, error: &TransferError) {
        self.send(SinkEvent::Failed {
            id: self.id.clone(),
            error: error.to_string(),
        });
    }

    fn on_cancelled(&self) {
        self.send(SinkEvent::Cancelled { id: self.id.clone() });
    }

    fn on_completed(&self) {
        self.send(SinkEvent::Completed { id: self.id.clone() });
    }
}
