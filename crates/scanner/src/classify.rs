//! Eligible file discovery.
//!
//! [`FileClassifier`] expands the configured targets into the files worth
//! scanning this cycle and splits them by size.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use differ_core::config::ScanConfig;

/// A file that passed every eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Result of one classification pass.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Files to scan
    pub normal: Vec<EligibleFile>,
    /// Files larger than the size limit, reported instead of scanned
    pub oversized: Vec<EligibleFile>,
}

/// Decides which files are scanned.
#[derive(Debug, Clone)]
pub struct FileClassifier {
    targets: Vec<PathBuf>,
    blacklist: HashSet<PathBuf>,
    valid_extensions: HashSet<String>,
    ignored_extensions: HashSet<String>,
    max_file_size: u64,
}

impl FileClassifier {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            targets: config.targets.iter().map(PathBuf::from).collect(),
            blacklist: config.blacklist.iter().map(PathBuf::from).collect(),
            valid_extensions: config.valid_extensions.iter().cloned().collect(),
            ignored_extensions: config.ignored_extensions.iter().cloned().collect(),
            max_file_size: config.max_file_size,
        }
    }

    /// Walks every target once.
    ///
    /// A file target is checked directly, a directory contributes its direct
    /// regular-file children. Missing targets contribute nothing.
    pub fn classify(&self) -> Classification {
        let mut result = Classification::default();

        for target in &self.targets {
            if target.is_file() {
                self.consider(target, &mut result);
            } else if target.is_dir() {
                let entries = match std::fs::read_dir(target) {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::warn!(dir = %target.display(), error = %e, "failed to list target directory");
                        continue;
                    }
                };

                // direct children only
                for entry in entries {
                    let entry = match entry {
                        Ok(e) => e,
                        Err(e) => {
                            tracing::debug!(error = %e, "failed to read directory entry");
                            continue;
                        }
                    };
                    let path = entry.path();
                    if path.is_file() {
                        self.consider(&path, &mut result);
                    }
                }
            } else {
                tracing::debug!(path = %target.display(), "target missing or not a regular file");
            }
        }

        result
    }

    fn consider(&self, path: &Path, result: &mut Classification) {
        if self.blacklist.contains(path) {
            return;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                // usually a rotation in progress
                tracing::debug!(path = %path.display(), error = %e, "failed to stat candidate");
                return;
            }
        };

        let extension = extension_of(path);
        if self.ignored_extensions.contains(extension) {
            return;
        }
        let is_target = self.targets.iter().any(|t| t == path);
        if !self.valid_extensions.contains(extension) && !is_target {
            return;
        }

        let file = EligibleFile {
            path: path.to_path_buf(),
            size: metadata.len(),
        };
        if file.size > self.max_file_size {
            tracing::warn!(
                path = %path.display(),
                size = file.size,
                max = self.max_file_size,
                "log file too large, reporting instead of scanning"
            );
            result.oversized.push(file);
        } else {
            result.normal.push(file);
        }
    }
}

/// Final `.`-separated segment of the file name; the whole name when it has no dot.
fn extension_of(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.rsplit('.').next())
        .unwrap_or("")
}
