//! One scan cycle: classify, rebuild positions, extract, emit, persist.
//!
//! [`ScanCycle`] is synchronous. The daemon drives it from
//! `tokio::task::spawn_blocking` on a fixed interval.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};

use differ_core::config::DifferConfig;
use differ_core::metrics as m;
use differ_core::{ErrorRecord, ErrorSink, Notifier};

use crate::classify::FileClassifier;
use crate::error::ScannerError;
use crate::extract::{BlockExtractor, ScanOutcome};
use crate::position::{PositionStore, rebuild};

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub files_scanned: usize,
    /// Files dropped this cycle after a stat or open failure
    pub files_skipped: usize,
    pub oversized_files: usize,
    pub rotations: usize,
    /// Files truncated in place (copytruncate) and rescanned from 0
    pub truncations: usize,
    pub records_emitted: usize,
    pub sink_failures: usize,
    pub bytes_scanned: u64,
    pub duration: Duration,
    /// Aggregated text handed to the notifier (empty when nothing was found)
    pub error_text: String,
}

/// Wires classifier, position store, extractor and collaborators together.
pub struct ScanCycle {
    classifier: FileClassifier,
    extractor: BlockExtractor,
    store: PositionStore,
    stale_threshold: Duration,
    sink: Arc<dyn ErrorSink>,
    notifier: Arc<dyn Notifier>,
    hostname: String,
}

impl ScanCycle {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state_path(&self) -> &Path {
        self.store.path()
    }

    /// Runs one cycle with the current time.
    pub fn run_once(&self) -> Result<CycleReport, ScannerError> {
        self.run_once_at(SystemTime::now())
    }

    /// Runs one cycle as if the clock read `now`.
    ///
    /// Per-file failures are logged and counted; only a failure to persist
    /// positions is returned, after every record has been emitted.
    pub fn run_once_at(&self, now: SystemTime) -> Result<CycleReport, ScannerError> {
        let started = Instant::now();
        let timestamp = DateTime::<Utc>::from(now);
        let mut report = CycleReport::default();

        let classification = self.classifier.classify();

        for file in &classification.oversized {
            let record = ErrorRecord::oversized(&file.path.display().to_string(), timestamp);
            report.error_text.push_str(&record.raw_message);
            report.error_text.push('\n');
            self.emit(&record, &mut report);
            report.oversized_files += 1;
            counter!(m::OVERSIZED_FILES_TOTAL).increment(1);
        }

        let previous = self.store.load();
        let rebuilt = rebuild(&classification.normal, &previous, self.stale_threshold, now);
        report.rotations = rebuilt.rotations;
        report.truncations = rebuilt.truncations;
        report.files_skipped += rebuilt.skipped;
        counter!(m::ROTATIONS_TOTAL, m::LABEL_KIND => "renamed").increment(rebuilt.rotations as u64);
        counter!(m::ROTATIONS_TOTAL, m::LABEL_KIND => "truncated")
            .increment(rebuilt.truncations as u64);
        counter!(m::FILES_SKIPPED_TOTAL, m::LABEL_REASON => "stat_failed")
            .increment(rebuilt.skipped as u64);

        let mut positions = rebuilt.positions;
        for file in &classification.normal {
            let key = file.path.display().to_string();
            let Some(start) = positions.get(&key).map(|p| p.offset) else {
                continue;
            };

            let outcome = match self.extractor.scan_at(&file.path, start, timestamp) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(path = %key, offset = start, error = %e, "failed to scan file, keeping offset");
                    report.files_skipped += 1;
                    counter!(m::FILES_SKIPPED_TOTAL, m::LABEL_REASON => "unreadable").increment(1);
                    continue;
                }
            };

            let consumed = outcome.offset.saturating_sub(start);
            report.files_scanned += 1;
            report.bytes_scanned += consumed;
            counter!(m::FILES_SCANNED_TOTAL).increment(1);
            counter!(m::BYTES_SCANNED_TOTAL).increment(consumed);

            if !outcome.error_text.is_empty() {
                report.error_text.push_str(&wrap_file_text(&key, &outcome.error_text));
            }
            for record in &outcome.records {
                self.emit(record, &mut report);
            }

            positions.record(&key, outcome.offset, outcome.identity);
        }

        if report.error_text.is_empty() {
            tracing::debug!("no errors this cycle, skipping notification");
        } else if let Err(e) = self.notifier.notify(&self.hostname, &report.error_text) {
            tracing::warn!(notifier = self.notifier.name(), error = %e, "failed to deliver notification");
        }

        let persisted = self.store.persist(&positions);

        report.duration = started.elapsed();
        counter!(m::CYCLES_TOTAL).increment(1);
        histogram!(m::CYCLE_DURATION_SECONDS).record(report.duration.as_secs_f64());
        tracing::info!(
            files_scanned = report.files_scanned,
            files_skipped = report.files_skipped,
            oversized = report.oversized_files,
            records = report.records_emitted,
            sink_failures = report.sink_failures,
            bytes = report.bytes_scanned,
            duration_ms = report.duration.as_millis() as u64,
            "scan cycle finished"
        );

        persisted?;
        Ok(report)
    }

    /// Scans one file from offset 0 without touching state or collaborators.
    pub fn debug_scan(&self, path: &Path) -> Result<ScanOutcome, ScannerError> {
        self.extractor.scan(path, 0)
    }

    fn emit(&self, record: &ErrorRecord, report: &mut CycleReport) {
        let stored = record.to_stored(&self.hostname);
        match self.sink.insert(&stored) {
            Ok(()) => {
                report.records_emitted += 1;
                counter!(m::RECORDS_EMITTED_TOTAL, m::LABEL_KIND => record.kind.to_string())
                    .increment(1);
            }
            Err(e) => {
                report.sink_failures += 1;
                counter!(m::SINK_ERRORS_TOTAL).increment(1);
                tracing::warn!(
                    sink = self.sink.name(),
                    path = %record.source_file,
                    error = %e,
                    "failed to store error record"
                );
            }
        }
    }
}

impl std::fmt::Debug for ScanCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCycle")
            .field("state_path", &self.store.path())
            .field("sink", &self.sink.name())
            .field("notifier", &self.notifier.name())
            .field("hostname", &self.hostname)
            .finish()
    }
}

/// Frames one file's error text for the notification blob.
pub fn wrap_file_text(path: &str, text: &str) -> String {
    format!("==> Start errors from : {path}\n{text}==> End errors from {path}\n")
}

/// Builder for [`ScanCycle`].
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use differ_core::{DifferConfig, MemorySink};
/// use differ_scanner::ScanCycleBuilder;
///
/// let sink = Arc::new(MemorySink::new());
/// let cycle = ScanCycleBuilder::new()
///     .config(DifferConfig::default())
///     .sink(sink.clone())
///     .notifier(sink)
///     .hostname("web01")
///     .build()
///     .unwrap();
/// let report = cycle.run_once().unwrap();
/// println!("{} records", report.records_emitted);
/// ```
#[derive(Default)]
pub struct ScanCycleBuilder {
    config: DifferConfig,
    sink: Option<Arc<dyn ErrorSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    hostname: Option<String>,
}

impl ScanCycleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DifferConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Overrides `general.hostname`.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Compiles every pattern and checks that collaborators are set.
    pub fn build(self) -> Result<ScanCycle, ScannerError> {
        let sink = self.sink.ok_or_else(|| ScannerError::Config {
            field: "sink".to_owned(),
            reason: "an error sink is required".to_owned(),
        })?;
        let notifier = self.notifier.ok_or_else(|| ScannerError::Config {
            field: "notifier".to_owned(),
            reason: "a notifier is required".to_owned(),
        })?;
        if self.config.scan.state_file.is_empty() {
            return Err(ScannerError::Config {
                field: "scan.state_file".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        let hostname = self
            .hostname
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| self.config.general.hostname.clone());

        Ok(ScanCycle {
            classifier: FileClassifier::from_config(&self.config.scan),
            extractor: BlockExtractor::new(&self.config.extract, &self.config.traceback)?,
            store: PositionStore::new(&self.config.scan.state_file),
            stale_threshold: Duration::from_secs(self.config.scan.max_mtime_secs),
            sink,
            notifier,
            hostname,
        })
    }
}
