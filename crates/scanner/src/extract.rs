//! Line-by-line error block extraction.
//!
//! One pass reads a file from its stored offset up to the size snapshot
//! taken when the pass starts. Lines are grouped into blocks by a three-state
//! machine:
//!
//! - `Idle`: waiting for a line that opens a block
//! - `Collecting { remaining }`: appending lines until a terminator or the
//!   tail budget runs out
//! - `Exhausted`: the budget ran out; the next line closes the block without
//!   being consumed and is then re-evaluated from `Idle`
//!
//! Every closed block becomes one [`ErrorRecord`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;

use differ_core::config::{ExtractConfig, TracebackConfig};
use differ_core::{ErrorRecord, RecordKind};

use crate::error::ScannerError;
use crate::position::file_identity;
use crate::traceback::TracebackParser;
use crate::truncate::truncate;

/// Result of one extractor pass over a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Offset to resume from next cycle
    pub offset: u64,
    /// Identity of the file that was read (0 for reader-backed passes)
    pub identity: u64,
    /// Concatenated text of every closed block, in file order
    pub error_text: String,
    /// One record per closed block, in file order
    pub records: Vec<ErrorRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Idle,
    Collecting { remaining: usize },
    Exhausted,
}

/// Mutable state of one pass.
struct ScanState<'a> {
    source: &'a str,
    now: DateTime<Utc>,
    offset: u64,
    state: BlockState,
    block: String,
    outcome: ScanOutcome,
}

/// Groups log lines into error records.
#[derive(Debug)]
pub struct BlockExtractor {
    config: ExtractConfig,
    error: Regex,
    end: Regex,
    ignore: Vec<Regex>,
    timestamps: Vec<Regex>,
    parser: TracebackParser,
}

impl BlockExtractor {
    /// Compiles every pattern and builds the default traceback parser.
    pub fn new(extract: &ExtractConfig, traceback: &TracebackConfig) -> Result<Self, ScannerError> {
        Self::with_parser(extract, TracebackParser::from_config(traceback)?)
    }

    /// Uses a caller-supplied parser, e.g. one with a custom frame recognizer.
    pub fn with_parser(
        extract: &ExtractConfig,
        parser: TracebackParser,
    ) -> Result<Self, ScannerError> {
        let ignore = extract
            .ignore_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let timestamps = extract
            .timestamp_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            error: Regex::new(&extract.error_pattern)?,
            end: Regex::new(&extract.end_pattern)?,
            ignore,
            timestamps,
            parser,
            config: extract.clone(),
        })
    }

    /// Scans `path` from `start` using the current time.
    pub fn scan(&self, path: &Path, start: u64) -> Result<ScanOutcome, ScannerError> {
        self.scan_at(path, start, Utc::now())
    }

    /// Scans `path` from `start` up to its current end.
    ///
    /// A `start` past the end reads nothing and keeps the offset; the next
    /// position rebuild sees the truncation and resets it.
    pub fn scan_at(
        &self,
        path: &Path,
        start: u64,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, ScannerError> {
        let mut file = File::open(path).map_err(|e| ScannerError::from_io(path, e))?;
        let metadata = file.metadata().map_err(|e| ScannerError::from_io(path, e))?;
        let end = metadata.len();
        let identity = file_identity(&metadata);

        if start > end {
            tracing::debug!(path = %path.display(), start, end, "file shrank since positions were rebuilt");
        }

        file.seek(SeekFrom::Start(start))
            .map_err(|e| ScannerError::from_io(path, e))?;

        let source = path.display().to_string();
        let mut outcome = self.extract(BufReader::new(file), start, end, &source, now)?;
        outcome.identity = identity;
        Ok(outcome)
    }

    /// Runs the state machine over `reader`, positioned at `start`, reading
    /// no further than `end`.
    pub fn extract<R: BufRead>(
        &self,
        reader: R,
        start: u64,
        end: u64,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, ScannerError> {
        let mut reader = reader.take(end.saturating_sub(start));
        let mut scan = ScanState {
            source,
            now,
            offset: start,
            state: BlockState::Idle,
            block: String::new(),
            outcome: ScanOutcome::default(),
        };

        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| ScannerError::Io {
                    path: source.to_owned(),
                    source: e,
                })?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            self.feed(&mut scan, &line, read as u64);
        }

        if scan.state != BlockState::Idle {
            self.close(&mut scan);
        }

        scan.outcome.offset = scan.offset;
        if !scan.outcome.records.is_empty() {
            tracing::debug!(
                path = source,
                records = scan.outcome.records.len(),
                offset = scan.offset,
                "blocks extracted"
            );
        }
        Ok(scan.outcome)
    }

    fn feed(&self, scan: &mut ScanState<'_>, line: &str, len: u64) {
        if scan.state == BlockState::Exhausted {
            // close without consuming, then treat the line as fresh
            self.close(scan);
        }

        if self.opens_block(line) {
            let budget = match scan.state {
                BlockState::Collecting { remaining } => remaining,
                _ => self.config.max_lines.max(1),
            };
            self.append(scan, line, len);
            scan.state = Self::after_append(budget);
            return;
        }

        match scan.state {
            BlockState::Collecting { .. } if self.terminates(line) => {
                self.append(scan, line, len);
                self.close(scan);
            }
            BlockState::Collecting { remaining } => {
                self.append(scan, line, len);
                scan.state = Self::after_append(remaining);
            }
            BlockState::Idle | BlockState::Exhausted => scan.offset += len,
        }
    }

    fn after_append(budget: usize) -> BlockState {
        match budget.saturating_sub(1) {
            0 => BlockState::Exhausted,
            remaining => BlockState::Collecting { remaining },
        }
    }

    fn append(&self, scan: &mut ScanState<'_>, line: &str, len: u64) {
        scan.block.push_str(&truncate(
            line,
            self.config.max_line_length,
            &self.config.max_line_suffix,
        ));
        scan.offset += len;
    }

    /// Matches the error pattern and none of the benign-noise patterns.
    pub fn opens_block(&self, line: &str) -> bool {
        self.error.is_match(line) && !self.ignore.iter().any(|re| re.is_match(line))
    }

    /// Starts with a timestamp or carries the end marker.
    pub fn terminates(&self, line: &str) -> bool {
        self.timestamps.iter().any(|re| re.is_match(line)) || self.end.is_match(line)
    }

    fn close(&self, scan: &mut ScanState<'_>) {
        let block = std::mem::take(&mut scan.block);
        scan.state = BlockState::Idle;
        if block.is_empty() {
            return;
        }
        let record = self.finalize(&block, scan.source, scan.now);
        scan.outcome.error_text.push_str(&block);
        scan.outcome.records.push(record);
    }

    /// Builds the record for one closed block.
    pub fn finalize(&self, block: &str, source: &str, now: DateTime<Utc>) -> ErrorRecord {
        let parsed = self.parser.parse(block);
        let product = parsed
            .location
            .as_deref()
            .and_then(|loc| self.parser.recognizer().product(loc));

        ErrorRecord {
            kind: RecordKind::Block,
            source_file: source.to_owned(),
            timestamp: now,
            raw_message: block.to_owned(),
            truncated_message: truncate(
                block,
                self.config.max_msg_length,
                &self.config.max_msg_suffix,
            )
            .into_owned(),
            truncated_exception_name: parsed.exception.map(|exc| {
                truncate(&exc, self.config.max_exc_length, &self.config.max_exc_suffix)
                    .into_owned()
            }),
            line_number: parsed.line_number,
            source_location: parsed.location.map(|loc| {
                truncate(
                    &loc,
                    self.config.max_location_length,
                    &self.config.max_location_suffix,
                )
                .into_owned()
            }),
            method_name: parsed.method,
            product,
        }
    }
}
