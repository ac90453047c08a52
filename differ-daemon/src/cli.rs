//! CLI argument definitions for differ-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// differ log error-block scanner.
///
/// Tails the configured log files, extracts error blocks and hands them to
/// storage. With FILE, scans that one file from the start and prints what it
/// finds without touching state or storage.
#[derive(Parser, Debug)]
#[command(name = "differ-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to differ.toml configuration file.
    #[arg(short, long, default_value = "/etc/differ/differ.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without scanning.
    #[arg(long)]
    pub validate: bool,

    /// Run a single scan cycle and exit.
    #[arg(long, conflicts_with = "file")]
    pub once: bool,

    /// Debug mode: scan this file from offset 0 and print the records.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}
