//! Scratch files and manager setups for integration tests.

use std::path::{Path, PathBuf};

use xfer_core::{ManagerOptions, TaskOptions, TransferManager, TransferRequest};

/// Writes a deterministic `len`-byte source file named `name` under `dir`.
pub fn source_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let body: Vec<u8> = (0u8..251).cycle().take(len).collect();
    std::fs::write(&path, body).expect("write source fixture");
    path
}

/// Request copying `source` into `dir/out/<file name>`.
pub fn request(source: &Path, dir: &Path) -> TransferRequest {
    TransferRequest::for_asset(source, &dir.join("out")).expect("source has a file name")
}

/// Manager with the given throttle, 1 KiB chunks and no persistence.
pub fn manager(speed_limit: u64, max_concurrent: Option<usize>) -> TransferManager {
    TransferManager::local(ManagerOptions {
        task: TaskOptions {
            chunk_size: 1024,
            speed_limit_bytes_per_sec: speed_limit,
            progress_step_bytes: 0,
        },
        max_concurrent,
        completed_cache_path: None,
    })
}
