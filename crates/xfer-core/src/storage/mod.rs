//! Locator resolution: turns opaque source/destination strings into streams.
//!
//! Tasks only see the `Storage` trait, so a network-backed source can replace
//! `LocalStorage` without changing task or manager behavior.

mod local;

pub use local::LocalStorage;

use crate::error::TransferError;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// An opened source and its length in bytes.
pub struct SourceStream {
    pub reader: Box<dyn Read + Send>,
    pub total_bytes: u64,
}

/// Resolves locators for the copy loop and for manager bookkeeping.
pub trait Storage: Send + Sync + 'static {
    /// Open the source for reading. Missing sources map to `SourceNotFound`.
    fn open_source(&self, locator: &str) -> Result<SourceStream, TransferError>;

    /// Create (truncate) the destination, creating its parent directory.
    /// Failures map to `DestinationUnwritable`.
    fn create_destination(&self, locator: &str) -> Result<Box<dyn Write + Send>, TransferError>;

    /// Remove a destination. Removing a missing destination is not an error.
    fn remove_destination(&self, locator: &str) -> io::Result<()>;

    /// Whether the destination currently exists. Best effort; the answer can
    /// be stale by the time the caller acts on it.
    fn destination_exists(&self, locator: &str) -> bool;
}

/// Destination for `source` inside `dir`: `dir/<file name of source>`.
/// Returns `None` if the source has no file name component.
pub fn destination_for(source: &Path, dir: &Path) -> Option<PathBuf> {
    source.file_name().map(|name| dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_uses_file_name() {
        let d = destination_for(Path::new("/music/album/track01.wav"), Path::new("/tmp/dl"));
        assert_eq!(d, Some(PathBuf::from("/tmp/dl/track01.wav")));
    }

    #[test]
    fn destination_without_file_name() {
        assert_eq!(destination_for(Path::new("/"), Path::new("/tmp")), None);
    }
}
