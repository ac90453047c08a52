#![doc = include_str!("../README.md")]

pub mod classify;
pub mod cycle;
pub mod error;
pub mod extract;
pub mod position;
pub mod traceback;
pub mod truncate;

pub use classify::{Classification, EligibleFile, FileClassifier};
pub use cycle::{CycleReport, ScanCycle, ScanCycleBuilder, wrap_file_text};
pub use error::ScannerError;
pub use extract::{BlockExtractor, ScanOutcome};
pub use position::{FilePosition, PositionMap, PositionStore, Rebuilt, file_identity, rebuild};
pub use traceback::{
    FileLineRecognizer, FrameClass, FrameLocation, FrameRecognizer, ParsedBlock, TracebackParser,
};
pub use truncate::truncate;
