#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod sink;

// --- re-exports ---

// errors
pub use error::{ConfigError, DifferError, ScanError, SinkError};

// config
pub use config::DifferConfig;

// records
pub use record::{ErrorRecord, NO_METHOD_LISTED, RecordKind, StoredError};

// collaborators
pub use sink::{ErrorSink, MemorySink, Notifier};
