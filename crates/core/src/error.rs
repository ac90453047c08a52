//! Error types shared across the workspace.

/// Top-level differ error.
#[derive(Debug, thiserror::Error)]
pub enum DifferError {
    /// Configuration problem
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Scan cycle failure (classification, state, extraction)
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// Storage or notification collaborator failure
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds a value outside its accepted range
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Scan cycle errors, as seen from outside the scanner crate.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A file could not be read
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// Position state could not be written
    #[error("state file {path}: {reason}")]
    State { path: String, reason: String },

    /// The scanner could not be constructed
    #[error("scanner init failed: {0}")]
    InitFailed(String),
}

/// Errors raised by storage/notification collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Destination rejected or failed the write
    #[error("write to {target} failed: {reason}")]
    Write { target: String, reason: String },

    /// The record could not be serialized
    #[error("serialization failed: {0}")]
    Serialize(String),
}
