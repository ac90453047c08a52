//! Error records produced by the extractor and the shape handed to storage.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Method name recorded when a frame line names no method.
pub const NO_METHOD_LISTED: &str = "NO_METHOD_LISTED";

/// Storage column width for the method name.
pub const MAX_STORED_METHOD_LEN: usize = 32;

/// Storage column width for the product name.
pub const MAX_STORED_PRODUCT_LEN: usize = 8;

/// How a record came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A block of lines extracted from a log file
    Block,
    /// A file too large to scan, reported instead of read
    Oversized,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::Oversized => write!(f, "oversized"),
        }
    }
}

/// One extracted error occurrence.
///
/// Optional fields are absent when the block carried no recognizable
/// traceback; consumers must tolerate that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Origin of the record
    pub kind: RecordKind,
    /// Log file the block was read from
    pub source_file: String,
    /// When the block was closed
    pub timestamp: DateTime<Utc>,
    /// Assembled block text (per-line caps already applied)
    pub raw_message: String,
    /// `raw_message` after the whole-message cap
    pub truncated_message: String,
    /// Exception name after its cap
    pub truncated_exception_name: Option<String>,
    /// Line number of the winning frame
    pub line_number: Option<u32>,
    /// File of the winning frame, after the location cap
    pub source_location: Option<String>,
    /// Method of the winning frame
    pub method_name: Option<String>,
    /// Owning product derived from the location
    pub product: Option<String>,
}

impl ErrorRecord {
    /// Record reported for a file that exceeds the size limit.
    pub fn oversized(path: &str, now: DateTime<Utc>) -> Self {
        let message = format!("Log file {path} ignored by differ because it is too large");
        Self {
            kind: RecordKind::Oversized,
            source_file: path.to_owned(),
            timestamp: now,
            raw_message: message.clone(),
            truncated_message: message,
            truncated_exception_name: None,
            line_number: None,
            source_location: None,
            method_name: None,
            product: None,
        }
    }

    /// Converts into the storage request, applying column widths.
    pub fn to_stored(&self, hostname: &str) -> StoredError {
        StoredError {
            source_file: self.source_file.clone(),
            product: self
                .product
                .as_deref()
                .map(|p| p.chars().take(MAX_STORED_PRODUCT_LEN).collect()),
            location: self.source_location.clone(),
            method: self
                .method_name
                .as_deref()
                .map(|m| m.chars().take(MAX_STORED_METHOD_LEN).collect()),
            message: self.truncated_message.clone(),
            exception: self.truncated_exception_name.clone(),
            line_number: self.line_number,
            epoch_seconds: self.timestamp.timestamp(),
            hostname: hostname.to_owned(),
        }
    }
}

/// Comma-separated one-line form used by the debug scan.
impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.source_file,
            self.product.as_deref().unwrap_or("None"),
            self.source_location.as_deref().unwrap_or("None"),
            self.method_name.as_deref().unwrap_or("None"),
            self.truncated_message,
            self.truncated_exception_name.as_deref().unwrap_or("None"),
        )
    }
}

/// Payload of one storage insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredError {
    pub source_file: String,
    pub product: Option<String>,
    pub location: Option<String>,
    pub method: Option<String>,
    pub message: String,
    pub exception: Option<String>,
    pub line_number: Option<u32>,
    pub epoch_seconds: i64,
    pub hostname: String,
}
