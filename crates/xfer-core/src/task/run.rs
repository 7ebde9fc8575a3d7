//! The copy loop.

use std::io::{self, Read, Write};
use std::time::Instant;

use super::control::Flow;
use super::progress::ProgressGate;
use super::throttle::ThrottleWindow;
use super::{TaskState, TransferTask};
use crate::error::TransferError;
use crate::storage::SourceStream;

enum CopyEnd {
    Finished,
    Cancelled,
}

impl TransferTask {
    /// Run the task to a terminal state on the current thread and fire exactly
    /// one terminal callback.
    pub fn run(self) -> TaskState {
        let id = self.shared.id.clone();
        if !self.shared.begin() {
            tracing::info!(%id, "cancelled before start");
            self.sink.on_cancelled();
            return TaskState::Cancelled;
        }
        tracing::info!(%id, source = %self.source, destination = %self.destination, "transfer started");

        let mut created = false;
        match self.copy(&mut created) {
            Ok(CopyEnd::Finished) if self.shared.finish(TaskState::Completed) => {
                tracing::info!(%id, bytes = self.shared.bytes_transferred(), "transfer completed");
                self.sink.on_progress(1.0);
                self.sink.on_completed();
                TaskState::Completed
            }
            Ok(_) => self.cancelled(created),
            Err(e) => {
                if !self.shared.finish(TaskState::Errored) {
                    // Failure while tearing down after a cancel request.
                    return self.cancelled(created);
                }
                tracing::warn!(%id, kind = e.kind(), "transfer failed: {}", e);
                self.sink.on_error(&e);
                TaskState::Errored
            }
        }
    }

    fn cancelled(&self, created: bool) -> TaskState {
        if created {
            if let Err(e) = self.storage.remove_destination(&self.destination) {
                tracing::warn!(
                    id = %self.shared.id,
                    destination = %self.destination,
                    "failed to delete incomplete file: {}",
                    e
                );
            }
        }
        tracing::info!(id = %self.shared.id, bytes = self.shared.bytes_transferred(), "transfer cancelled");
        self.sink.on_cancelled();
        TaskState::Cancelled
    }

    /// Streams are dropped (closed) before this returns, so the caller may
    /// delete the destination afterwards.
    fn copy(&self, created: &mut bool) -> Result<CopyEnd, TransferError> {
        let SourceStream {
            mut reader,
            total_bytes,
        } = self.storage.open_source(&self.source)?;
        self.shared.set_total(total_bytes);

        let mut writer = self.storage.create_destination(&self.destination)?;
        *created = true;

        let mut buf = vec![0u8; self.options.chunk_size.max(1)];
        let mut gate = ProgressGate::new(self.options.progress_step_bytes);
        let mut window = ThrottleWindow::new(Instant::now());

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if self.shared.checkpoint() == Flow::Cancel {
                return Ok(CopyEnd::Cancelled);
            }

            writer.write_all(&buf[..n])?;
            let done = self.shared.add_bytes(n as u64);
            if let Some(fraction) = gate.observe(done, total_bytes) {
                self.sink.on_progress(fraction);
            }

            let limit = self.shared.speed_limit();
            if let Some(wait) = window.record(n as u64, limit, Instant::now()) {
                if self.shared.sleep(wait) == Flow::Cancel {
                    return Ok(CopyEnd::Cancelled);
                }
                window.reset(Instant::now());
            }
        }

        writer.flush()?;
        Ok(CopyEnd::Finished)
    }
}
