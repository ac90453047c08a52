//! Durable per-file read positions.
//!
//! The map is rebuilt from scratch every cycle from the classifier output,
//! so files that stop being eligible simply fall out of it. Persisting goes
//! through a sibling temporary file and a rename.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::classify::EligibleFile;
use crate::error::ScannerError;

/// Read offset and identity of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePosition {
    pub offset: u64,
    pub identity: u64,
}

/// Path to position mapping, serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionMap {
    entries: BTreeMap<String, FilePosition>,
}

impl PositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FilePosition> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilePosition)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sets a position without any ordering check.
    pub fn insert(&mut self, path: impl Into<String>, position: FilePosition) {
        self.entries.insert(path.into(), position);
    }

    /// Applies one scan result.
    ///
    /// Returns `false` and leaves the entry untouched when the offset would
    /// move backwards under the same identity.
    pub fn record(&mut self, path: &str, offset: u64, identity: u64) -> bool {
        if let Some(current) = self.entries.get(path) {
            if current.identity == identity && offset < current.offset {
                tracing::warn!(
                    path,
                    current = current.offset,
                    offset,
                    "refusing to move offset backwards"
                );
                return false;
            }
        }
        self.entries
            .insert(path.to_owned(), FilePosition { offset, identity });
        true
    }
}

/// Outcome of [`rebuild`].
#[derive(Debug, Clone, Default)]
pub struct Rebuilt {
    pub positions: PositionMap,
    /// Files whose identity changed since the last cycle
    pub rotations: usize,
    /// Files shrunk below their stored offset under the same identity
    pub truncations: usize,
    /// Files fast-forwarded because they were not modified recently
    pub stale: usize,
    /// Files dropped because they could not be stat'd
    pub skipped: usize,
}

/// Computes this cycle's positions.
///
/// Per file: stat failure skips it; a modification time at least
/// `stale_threshold` before `now` puts the offset at the end; a changed
/// identity or a size below the stored offset (truncated in place) restarts
/// at 0; a known file keeps its position; a new file starts at 0. `previous`
/// is never mutated.
pub fn rebuild(
    eligible: &[EligibleFile],
    previous: &PositionMap,
    stale_threshold: Duration,
    now: SystemTime,
) -> Rebuilt {
    let mut out = Rebuilt::default();

    for file in eligible {
        let key = file.path.display().to_string();
        let metadata = match std::fs::metadata(&file.path) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %key, error = %e, "failed to stat file, skipping this cycle");
                out.skipped += 1;
                continue;
            }
        };

        let identity = file_identity(&metadata);
        let size = metadata.len();
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or_default();

        let position = if age >= stale_threshold {
            out.stale += 1;
            FilePosition {
                offset: size,
                identity,
            }
        } else {
            match previous.get(&key) {
                Some(prev) if prev.identity != identity => {
                    tracing::info!(
                        path = %key,
                        old_identity = prev.identity,
                        new_identity = identity,
                        "log rotation detected, restarting from offset 0"
                    );
                    out.rotations += 1;
                    FilePosition {
                        offset: 0,
                        identity,
                    }
                }
                Some(prev) if prev.offset > size => {
                    tracing::info!(
                        path = %key,
                        offset = prev.offset,
                        size,
                        "file truncated in place, restarting from offset 0"
                    );
                    out.truncations += 1;
                    FilePosition {
                        offset: 0,
                        identity,
                    }
                }
                Some(prev) => *prev,
                None => FilePosition {
                    offset: 0,
                    identity,
                },
            }
        };

        out.positions.insert(key, position);
    }

    out
}

/// Stable per-file identifier: the inode number on unix.
#[cfg(unix)]
pub fn file_identity(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

/// Stable per-file identifier; unavailable off unix.
#[cfg(not(unix))]
pub fn file_identity(_metadata: &Metadata) -> u64 {
    0
}

/// JSON file holding the last persisted [`PositionMap`].
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted map. Missing or corrupt state yields an empty map.
    pub fn load(&self) -> PositionMap {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no position state yet");
                return PositionMap::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read position state, starting empty");
                return PositionMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt position state, starting empty");
                PositionMap::new()
            }
        }
    }

    /// Atomically replaces the state file with `map`.
    pub fn persist(&self, map: &PositionMap) -> Result<(), ScannerError> {
        let state_err = |reason: String| ScannerError::State {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| state_err(format!("create parent dir: {e}")))?;
        }

        let json =
            serde_json::to_string_pretty(map).map_err(|e| state_err(format!("serialize: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|e| state_err(format!("write temp file: {e}")))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| state_err(format!("rename: {e}")))?;

        tracing::debug!(path = %self.path.display(), files = map.len(), "position state persisted");
        Ok(())
    }
}
