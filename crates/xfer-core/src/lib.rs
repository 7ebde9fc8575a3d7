//! Background file transfer engine.
//!
//! A [`TransferManager`] accepts transfer requests keyed by a stable id, runs
//! each as a [`TransferTask`] on its own worker thread, and reports progress
//! and the terminal outcome to a caller-supplied [`ProgressSink`]. Tasks can be
//! paused, resumed, cancelled and throttled while they run.

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod sink;
pub mod storage;
pub mod task;

pub use error::{ControlError, StartRejected, TransferError};
pub use manager::{CompletedCache, ManagerOptions, TransferManager, TransferRequest};
pub use sink::{ChannelSink, LogSink, ProgressSink, SinkEvent};
pub use storage::{LocalStorage, SourceStream, Storage};
pub use task::{TaskHandle, TaskOptions, TaskSnapshot, TaskState, TransferTask};
