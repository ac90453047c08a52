//! Configuration management: `differ.toml` parsing and runtime settings.
//!
//! [`DifferConfig`] is the top-level structure holding every section.
//! Each component reads only its own section.
//!
//! # Load precedence
//! 1. CLI arguments (highest)
//! 2. Environment variables (`DIFFER_SCAN_INTERVAL_SECS=30` form)
//! 3. Config file (`differ.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), differ_core::error::DifferError> {
//! use differ_core::config::DifferConfig;
//!
//! // file + env overrides
//! let config = DifferConfig::load("differ.toml").await?;
//!
//! // straight from a TOML string
//! let config = DifferConfig::parse("[scan]\ninterval_secs = 30")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DifferError};

/// Complete differ configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifferConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// What to monitor and where to keep positions
    #[serde(default)]
    pub scan: ScanConfig,
    /// Block extraction patterns and caps
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Traceback frame classification
    #[serde(default)]
    pub traceback: TracebackConfig,
    /// Reference storage sink
    #[serde(default)]
    pub storage: StorageConfig,
    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl DifferConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DifferError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DifferError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DifferError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DifferError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, DifferError> {
        toml::from_str(toml_str).map_err(|e| {
            DifferError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies `DIFFER_{SECTION}_{FIELD}` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DIFFER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DIFFER_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.hostname, "DIFFER_GENERAL_HOSTNAME");

        // Scan
        override_csv(&mut self.scan.targets, "DIFFER_SCAN_TARGETS");
        override_csv(&mut self.scan.blacklist, "DIFFER_SCAN_BLACKLIST");
        override_u64(&mut self.scan.max_file_size, "DIFFER_SCAN_MAX_FILE_SIZE");
        override_u64(&mut self.scan.max_mtime_secs, "DIFFER_SCAN_MAX_MTIME_SECS");
        override_string(&mut self.scan.state_file, "DIFFER_SCAN_STATE_FILE");
        override_u64(&mut self.scan.interval_secs, "DIFFER_SCAN_INTERVAL_SECS");

        // Extract
        override_usize(&mut self.extract.max_lines, "DIFFER_EXTRACT_MAX_LINES");

        // Storage
        override_string(&mut self.storage.path, "DIFFER_STORAGE_PATH");

        // Metrics
        override_bool(&mut self.metrics.enabled, "DIFFER_METRICS_ENABLED");
        override_u16(&mut self.metrics.port, "DIFFER_METRICS_PORT");
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), DifferError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        for target in &self.scan.targets {
            if !Path::new(target).is_absolute() {
                return Err(invalid(
                    "scan.targets",
                    format!("target '{target}' must be an absolute path"),
                ));
            }
        }

        if self.scan.state_file.is_empty() {
            return Err(invalid("scan.state_file", "must not be empty".to_owned()));
        }

        if self.scan.interval_secs == 0 {
            return Err(invalid(
                "scan.interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.extract.max_lines == 0 {
            return Err(invalid(
                "extract.max_lines",
                "must be greater than 0".to_owned(),
            ));
        }

        let caps = [
            ("extract.max_line_length", self.extract.max_line_length),
            ("extract.max_msg_length", self.extract.max_msg_length),
            ("extract.max_exc_length", self.extract.max_exc_length),
            ("extract.max_location_length", self.extract.max_location_length),
        ];
        for (field, value) in caps {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_owned()));
            }
        }

        if self.extract.timestamp_patterns.len() != 2 {
            return Err(invalid(
                "extract.timestamp_patterns",
                format!(
                    "exactly 2 patterns required, got {}",
                    self.extract.timestamp_patterns.len()
                ),
            ));
        }

        check_regex("extract.error_pattern", &self.extract.error_pattern)?;
        check_regex("extract.end_pattern", &self.extract.end_pattern)?;
        for pattern in &self.extract.ignore_patterns {
            check_regex("extract.ignore_patterns", pattern)?;
        }
        for pattern in &self.extract.timestamp_patterns {
            check_regex("extract.timestamp_patterns", pattern)?;
        }

        if self.traceback.first_party_root.is_empty() {
            return Err(invalid(
                "traceback.first_party_root",
                "must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> DifferError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn check_regex(field: &str, pattern: &str) -> Result<(), DifferError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| invalid(field, format!("invalid regex '{pattern}': {e}")))
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// Host name reported with every stored record. Empty means detect.
    pub hostname: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            hostname: String::new(),
        }
    }
}

/// Monitored files and position state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Files or directories to monitor (absolute paths, directories are not recursed)
    pub targets: Vec<String>,
    /// Exact file paths never to touch
    pub blacklist: Vec<String>,
    /// Extensions eligible for scanning
    pub valid_extensions: Vec<String>,
    /// Extensions always skipped (rotated archives)
    pub ignored_extensions: Vec<String>,
    /// Files larger than this are reported instead of scanned (bytes)
    pub max_file_size: u64,
    /// Files not modified for this long are fast-forwarded to their end (seconds)
    pub max_mtime_secs: u64,
    /// Position store location
    pub state_file: String,
    /// Delay between scan cycles (seconds)
    pub interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                "/var/log/paste".to_owned(),
                "/var/log/syslog".to_owned(),
                "/var/log/mcelog".to_owned(),
            ],
            blacklist: Vec::new(),
            valid_extensions: vec!["log".to_owned()],
            ignored_extensions: vec!["gz".to_owned()],
            max_file_size: 512 * 1024 * 1024, // 512MB
            max_mtime_secs: 86_400,
            state_file: "/var/lib/differ/differ.state".to_owned(),
            interval_secs: 60,
        }
    }
}

/// Error block extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Tail budget: max lines collected into one block
    pub max_lines: usize,
    /// Per-line cap (characters)
    pub max_line_length: usize,
    /// Suffix appended to capped lines
    pub max_line_suffix: String,
    /// Whole-message cap (characters)
    pub max_msg_length: usize,
    /// Suffix appended to capped messages
    pub max_msg_suffix: String,
    /// Exception name cap (characters)
    pub max_exc_length: usize,
    /// Suffix appended to capped exception names
    pub max_exc_suffix: String,
    /// Location cap (characters)
    pub max_location_length: usize,
    /// Suffix appended to capped locations
    pub max_location_suffix: String,
    /// Lines matching this open (or extend) a block
    pub error_pattern: String,
    /// Lines matching this close an open block
    pub end_pattern: String,
    /// Known-benign lines that never open a block
    pub ignore_patterns: Vec<String>,
    /// Two timestamp prefixes that close an open block
    pub timestamp_patterns: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_lines: 100,
            max_line_length: 250,
            max_line_suffix: "...\n".to_owned(),
            max_msg_length: 5000,
            max_msg_suffix: "<snip>".to_owned(),
            max_exc_length: 36,
            max_exc_suffix: "...".to_owned(),
            max_location_length: 80,
            max_location_suffix: "<snip>".to_owned(),
            error_pattern:
                r"(\sERROR[^?]|^\s*Traceback|^\s*Error|^  File |InnoDB: Error:|\s+WARNING\s+)"
                    .to_owned(),
            end_pattern: "(DeprecationWarning)".to_owned(),
            ignore_patterns: vec![
                r"\[ERROR\] Error reading packet from server: Lost connection to MySQL server during query".to_owned(),
                r"\[drm:edid_is_valid\]".to_owned(),
                r"\[drm:drm_edid_block_valid\]".to_owned(),
                r"\[drm:radeon_dvi_detect\]".to_owned(),
                r"mysqld: Sort aborted".to_owned(),
                r"\[drm:drm_helper_initial_config\]".to_owned(),
            ],
            timestamp_patterns: vec![
                r"^\d{2}:\d{2}:\d{2}".to_owned(),
                r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}".to_owned(),
            ],
        }
    }
}

/// Traceback frame classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracebackConfig {
    /// Frames under this root are first-party code
    pub first_party_root: String,
    /// Shared library subpath of the first-party root (lower precedence)
    pub shared_root: String,
}

impl Default for TracebackConfig {
    fn default() -> Self {
        Self {
            first_party_root: "/var/www/".to_owned(),
            shared_root: "/var/www/example".to_owned(),
        }
    }
}

/// Reference storage sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON-lines output file. Empty means records are only logged.
    pub path: String,
}

/// Prometheus exporter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the exporter
    pub enabled: bool,
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9107,
        }
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = DifferConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.scan.valid_extensions, vec!["log"]);
        assert_eq!(config.scan.ignored_extensions, vec!["gz"]);
        assert_eq!(config.extract.max_lines, 100);
        assert_eq!(config.extract.timestamp_patterns.len(), 2);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        DifferConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = DifferConfig::parse("").unwrap();
        assert_eq!(config.scan.interval_secs, 60);
        assert_eq!(config.traceback.first_party_root, "/var/www/");
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let toml = r#"
[scan]
targets = ["/srv/logs"]
interval_secs = 15

[extract]
max_lines = 20
"#;
        let config = DifferConfig::parse(toml).unwrap();
        assert_eq!(config.scan.targets, vec!["/srv/logs"]);
        assert_eq!(config.scan.interval_secs, 15);
        // untouched fields keep defaults
        assert_eq!(config.scan.max_mtime_secs, 86_400);
        assert_eq!(config.extract.max_lines, 20);
        assert_eq!(config.extract.max_line_suffix, "...\n");
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = DifferConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            DifferError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = DifferConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_relative_target() {
        let mut config = DifferConfig::default();
        config.scan.targets = vec!["logs/app.log".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scan.targets"));
    }

    #[test]
    fn validate_rejects_zero_tail_budget() {
        let mut config = DifferConfig::default();
        config.extract.max_lines = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_lines"));
    }

    #[test]
    fn validate_rejects_bad_regex() {
        let mut config = DifferConfig::default();
        config.extract.ignore_patterns.push("([unclosed".to_owned());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ignore_patterns"));
    }

    #[test]
    fn validate_requires_two_timestamp_patterns() {
        let mut config = DifferConfig::default();
        config.extract.timestamp_patterns.pop();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timestamp_patterns"));
    }

    #[test]
    #[serial]
    fn env_override_csv() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: serialized test, no other thread touches the environment.
        unsafe { std::env::set_var("TEST_DIFFER_CSV", "/x, /y,, /z") };
        override_csv(&mut val, "TEST_DIFFER_CSV");
        assert_eq!(val, vec!["/x", "/y", "/z"]);
        unsafe { std::env::remove_var("TEST_DIFFER_CSV") };
    }

    #[test]
    #[serial]
    fn env_override_bad_number_keeps_original() {
        let mut val = 60u64;
        // SAFETY: serialized test, no other thread touches the environment.
        unsafe { std::env::set_var("TEST_DIFFER_U64_BAD", "soon") };
        override_u64(&mut val, "TEST_DIFFER_U64_BAD");
        assert_eq!(val, 60);
        unsafe { std::env::remove_var("TEST_DIFFER_U64_BAD") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = DifferConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = DifferConfig::parse(&toml_str).unwrap();
        assert_eq!(config.extract.error_pattern, parsed.extract.error_pattern);
        assert_eq!(config.scan.state_file, parsed.scan.state_file);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = DifferConfig::from_file("/nonexistent/path/differ.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DifferError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
