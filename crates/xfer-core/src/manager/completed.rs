//! Set of destinations known to hold a fully transferred file.
//!
//! Entries go stale when a file is deleted behind our back; callers prune
//! with an existence check before trusting an entry. The set can be persisted
//! as JSON under the XDG state dir and is re-validated on load.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedCache {
    destinations: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCompleted {
    destinations: Vec<String>,
}

impl CompletedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, destination: impl Into<String>) -> bool {
        self.destinations.insert(destination.into())
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.destinations.contains(destination)
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Drop entries whose file no longer exists. Returns how many were removed.
    pub fn prune<F>(&mut self, exists: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.destinations.len();
        self.destinations.retain(|d| exists(d));
        before - self.destinations.len()
    }

    /// Default path: `~/.local/state/xfer/completed.json` (creates the state dir).
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("xfer")?;
        xdg_dirs
            .place_state_file("completed.json")
            .context("create xfer state dir")
    }

    /// Save to `path` (creates the parent dir if needed).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let snapshot = PersistedCompleted {
            destinations: self.destinations.iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot).context("serialize completed set")?;
        std::fs::write(path, json)
            .with_context(|| format!("write completed set: {}", path.display()))?;
        Ok(())
    }

    /// Load from `path`, keeping only entries for which `exists` holds.
    /// A missing file yields `None`.
    pub fn load_from_path<F>(path: &Path, exists: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> bool,
    {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read completed set: {}", path.display()))
            }
        };
        let snapshot: PersistedCompleted = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse completed set: {}", path.display()))?;
        let mut cache = CompletedCache::new();
        for d in snapshot.destinations {
            if exists(&d) {
                cache.insert(d);
            }
        }
        Ok(Some(cache))
    }
}
