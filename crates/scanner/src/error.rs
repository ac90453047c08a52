//! Scanner error types
//!
//! [`ScannerError`] covers everything that can go wrong inside the scanner.
//! `From<ScannerError> for DifferError` lets upper layers propagate with `?`.

use differ_core::error::{DifferError, ScanError};

/// Scanner domain error
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// The file exists but may not be read
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// File path
        path: String,
    },

    /// Any other I/O failure on a scanned file
    #[error("io error on {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Position state could not be written
    #[error("state error: {path}: {reason}")]
    State {
        /// State file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// A configured pattern failed to compile
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Scanner configuration problem
    #[error("config error: {field}: {reason}")]
    Config {
        /// Config field
        field: String,
        /// Failure reason
        reason: String,
    },
}

impl ScannerError {
    /// Maps an open/read failure on `path` to the matching variant.
    pub fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.display().to_string(),
            }
        } else {
            Self::Io {
                path: path.display().to_string(),
                source,
            }
        }
    }
}

impl From<ScannerError> for DifferError {
    fn from(err: ScannerError) -> Self {
        match err {
            ScannerError::PermissionDenied { path } => DifferError::Scan(ScanError::Unreadable {
                path,
                reason: "permission denied".to_owned(),
            }),
            ScannerError::Io { path, source } => DifferError::Scan(ScanError::Unreadable {
                path,
                reason: source.to_string(),
            }),
            ScannerError::State { path, reason } => {
                DifferError::Scan(ScanError::State { path, reason })
            }
            other => DifferError::Scan(ScanError::InitFailed(other.to_string())),
        }
    }
}
