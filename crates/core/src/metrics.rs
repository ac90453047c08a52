//! Metric names and descriptions.
//!
//! Every Prometheus metric is named here; the scanner calls
//! `metrics::counter!()` / `metrics::histogram!()` with these constants.
//!
//! # Naming
//!
//! - prefix: `differ_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)
//!
//! # Example
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(differ_core::metrics::RECORDS_EMITTED_TOTAL).increment(1);
//! ```

// ─── label keys ──────────────────────────────────────────────────────

/// Record kind label key (block, oversized); rotation kind (renamed, truncated)
pub const LABEL_KIND: &str = "kind";

/// Skip reason label key (unreadable, stat_failed)
pub const LABEL_REASON: &str = "reason";

// ─── scan cycle ──────────────────────────────────────────────────────

/// Completed scan cycles (counter)
pub const CYCLES_TOTAL: &str = "differ_cycles_total";

/// Files read by the extractor (counter)
pub const FILES_SCANNED_TOTAL: &str = "differ_files_scanned_total";

/// Files skipped for the cycle after a stat/open failure (counter, label: reason)
pub const FILES_SKIPPED_TOTAL: &str = "differ_files_skipped_total";

/// Files reported as oversized instead of scanned (counter)
pub const OVERSIZED_FILES_TOTAL: &str = "differ_oversized_files_total";

/// Rotations detected by identity change or in-place truncation (counter, label: kind)
pub const ROTATIONS_TOTAL: &str = "differ_rotations_total";

/// Bytes consumed by the extractor (counter)
pub const BYTES_SCANNED_TOTAL: &str = "differ_bytes_scanned_total";

/// Records emitted (counter, label: kind)
pub const RECORDS_EMITTED_TOTAL: &str = "differ_records_emitted_total";

/// Failed storage inserts (counter)
pub const SINK_ERRORS_TOTAL: &str = "differ_sink_errors_total";

/// Duration of one scan cycle (histogram, seconds)
pub const CYCLE_DURATION_SECONDS: &str = "differ_cycle_duration_seconds";

// ─── histogram buckets ──────────────────────────────────────────────

/// Cycle duration buckets (seconds), 10ms ~ 300s
pub const CYCLE_DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0];

/// Registers HELP text for every metric.
///
/// Call once after the global recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(CYCLES_TOTAL, "Total number of completed scan cycles");
    describe_counter!(
        FILES_SCANNED_TOTAL,
        "Total number of file passes made by the block extractor"
    );
    describe_counter!(
        FILES_SKIPPED_TOTAL,
        "Files skipped for a cycle because they could not be stat'd or opened"
    );
    describe_counter!(
        OVERSIZED_FILES_TOTAL,
        "Files reported instead of scanned because they exceed max_file_size"
    );
    describe_counter!(
        ROTATIONS_TOTAL,
        "Log rotations detected through a changed file identity or an in-place truncation"
    );
    describe_counter!(BYTES_SCANNED_TOTAL, "Total bytes consumed by the extractor");
    describe_counter!(RECORDS_EMITTED_TOTAL, "Error records emitted, by kind");
    describe_counter!(SINK_ERRORS_TOTAL, "Storage inserts that failed");
    describe_histogram!(CYCLE_DURATION_SECONDS, "Duration of a scan cycle in seconds");
}
