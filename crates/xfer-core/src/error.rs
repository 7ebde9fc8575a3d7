//! Error types for transfers and manager control calls.
//!
//! `TransferError` is what a task reports through `ProgressSink::on_error`.
//! `StartRejected` and `ControlError` are synchronous answers from the manager;
//! they are ordinary return values and never fatal.

use std::io;

/// Failure of a single transfer. Reported once through the sink, never retried.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The source locator does not resolve to a readable file.
    #[error("source not found: {locator}")]
    SourceNotFound { locator: String },

    /// The destination (or its parent directory) could not be created.
    #[error("destination not writable: {locator}: {source}")]
    DestinationUnwritable {
        locator: String,
        #[source]
        source: io::Error,
    },

    /// Read or write failed mid-transfer.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// The worker could not be started or was torn down before finishing.
    #[error("transfer interrupted: {0}")]
    Interrupted(String),
}

impl TransferError {
    /// Short machine-friendly name for logs and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::SourceNotFound { .. } => "source_not_found",
            TransferError::DestinationUnwritable { .. } => "destination_unwritable",
            TransferError::Io(_) => "io_failure",
            TransferError::Interrupted(_) => "interrupted",
        }
    }
}

/// Why `TransferManager::start_transfer` refused a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartRejected {
    #[error("{0} is already downloading")]
    AlreadyInFlight(String),
    #[error("{0} is already downloaded")]
    AlreadyCompleted(String),
}

/// Manager control call on an id that has no active task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("no active transfer with id {0}")]
    NotFound(String),
}
