//! Reference collaborators: JSON-lines storage and a tracing notifier.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use differ_core::{ErrorSink, Notifier, SinkError, StoredError};

/// `warning` when the message carries `WARNING`, `error` otherwise.
pub fn severity(message: &str) -> &'static str {
    if message.contains("WARNING") {
        "warning"
    } else {
        "error"
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    #[serde(flatten)]
    error: &'a StoredError,
    severity: &'static str,
}

/// Appends one JSON object per stored error to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let write_err = |reason: String| SinkError::Write {
            target: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| write_err(e.to_string()))?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorSink for JsonLinesSink {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn insert(&self, error: &StoredError) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(&JsonLine {
            error,
            severity: severity(&error.message),
        })
        .map_err(|e| SinkError::Serialize(e.to_string()))?;
        line.push('\n');

        let mut file = self.file.lock().map_err(|e| SinkError::Write {
            target: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        file.write_all(line.as_bytes())
            .map_err(|e| SinkError::Write {
                target: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Storage fallback when no `storage.path` is configured: records only hit the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn insert(&self, error: &StoredError) -> Result<(), SinkError> {
        tracing::info!(
            source_file = %error.source_file,
            product = error.product.as_deref().unwrap_or("-"),
            location = error.location.as_deref().unwrap_or("-"),
            exception = error.exception.as_deref().unwrap_or("-"),
            severity = severity(&error.message),
            "error record"
        );
        Ok(())
    }
}

/// Logs the cycle's error text instead of mailing it.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn name(&self) -> &str {
        "tracing"
    }

    fn notify(&self, hostname: &str, text: &str) -> Result<(), SinkError> {
        let files = text.matches("==> Start errors from").count();
        tracing::warn!(
            hostname,
            files,
            bytes = text.len(),
            text,
            "differ errors on {}",
            hostname
        );
        Ok(())
    }
}
