//! Filesystem-backed storage.

use super::{SourceStream, Storage};
use crate::error::TransferError;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

const IO_BUFFER_BYTES: usize = 64 * 1024;

/// Local paths as locators.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl Storage for LocalStorage {
    fn open_source(&self, locator: &str) -> Result<SourceStream, TransferError> {
        let path = Path::new(locator);
        let not_found = || TransferError::SourceNotFound {
            locator: locator.to_string(),
        };
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(TransferError::Io(e)),
        };
        if !meta.is_file() {
            return Err(not_found());
        }
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(),
            _ => TransferError::Io(e),
        })?;
        Ok(SourceStream {
            reader: Box::new(BufReader::with_capacity(IO_BUFFER_BYTES, file)),
            total_bytes: meta.len(),
        })
    }

    fn create_destination(&self, locator: &str) -> Result<Box<dyn Write + Send>, TransferError> {
        let path = Path::new(locator);
        let unwritable = |source: io::Error| TransferError::DestinationUnwritable {
            locator: locator.to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(unwritable)?;
        }
        let file = File::create(path).map_err(unwritable)?;
        Ok(Box::new(BufWriter::with_capacity(IO_BUFFER_BYTES, file)))
    }

    fn remove_destination(&self, locator: &str) -> io::Result<()> {
        match fs::remove_file(locator) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn destination_exists(&self, locator: &str) -> bool {
        Path::new(locator).is_file()
    }
}
