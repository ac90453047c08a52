//! Scan loop and one-shot modes.
//!
//! The loop ticks every `scan.interval_secs`, runs each cycle on the
//! blocking pool and stops between cycles on SIGTERM or SIGINT.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;

use differ_core::config::DifferConfig;
use differ_core::{ErrorSink, MemorySink, Notifier};
use differ_scanner::{CycleReport, ScanCycle, ScanCycleBuilder, wrap_file_text};

use crate::sinks::{JsonLinesSink, LogSink, TracingNotifier};

/// Host name stamped on stored records: configured, else the detected name
/// cut at its first `.`.
pub fn resolve_hostname(config: &DifferConfig) -> String {
    if !config.general.hostname.is_empty() {
        return config.general.hostname.clone();
    }
    match hostname::get() {
        Ok(name) => short_hostname(&name.to_string_lossy()).to_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to detect host name, using 'localhost'");
            "localhost".to_owned()
        }
    }
}

/// `web01.example.com` -> `web01`. A name without a leading label is kept whole.
pub fn short_hostname(name: &str) -> &str {
    match name.split('.').next() {
        Some(label) if !label.is_empty() => label,
        _ => name,
    }
}

/// Builds a scan cycle wired to the reference collaborators.
pub fn build_cycle(config: &DifferConfig) -> Result<ScanCycle> {
    let sink: Arc<dyn ErrorSink> = if config.storage.path.is_empty() {
        tracing::info!("no storage.path configured, error records will only be logged");
        Arc::new(LogSink)
    } else {
        Arc::new(
            JsonLinesSink::open(&config.storage.path)
                .map_err(|e| anyhow::anyhow!("failed to open storage sink: {}", e))?,
        )
    };
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);

    ScanCycleBuilder::new()
        .config(config.clone())
        .sink(sink)
        .notifier(notifier)
        .hostname(resolve_hostname(config))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build scan cycle: {}", e))
}

/// Builds a cycle for debug scans; nothing leaves the process.
pub fn build_debug_cycle(config: &DifferConfig) -> Result<ScanCycle> {
    let sink = Arc::new(MemorySink::new());
    ScanCycleBuilder::new()
        .config(config.clone())
        .sink(sink.clone())
        .notifier(sink)
        .hostname(resolve_hostname(config))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build scan cycle: {}", e))
}

/// Runs one cycle on the blocking pool.
pub async fn run_cycle(cycle: Arc<ScanCycle>) -> Result<CycleReport> {
    tokio::task::spawn_blocking(move || cycle.run_once())
        .await
        .map_err(|e| anyhow::anyhow!("scan cycle task failed: {}", e))?
        .map_err(|e| anyhow::anyhow!("scan cycle failed: {}", e))
}

/// Drives cycles until a shutdown signal arrives.
pub struct Runner {
    cycle: Arc<ScanCycle>,
    interval: Duration,
}

impl Runner {
    pub fn new(cycle: ScanCycle, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            interval,
        }
    }

    pub fn cycle(&self) -> &ScanCycle {
        &self.cycle
    }

    /// Single cycle, for `--once`.
    pub async fn run_once(&self) -> Result<CycleReport> {
        run_cycle(Arc::clone(&self.cycle)).await
    }

    /// Fixed-interval loop. A failed cycle is logged and the loop continues.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            hostname = self.cycle.hostname(),
            "differ-daemon running"
        );

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    let signal = signal?;
                    tracing::info!(signal, "shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = run_cycle(Arc::clone(&self.cycle)).await {
                        tracing::error!(error = %e, "scan cycle failed");
                    }
                }
            }
        }

        tracing::info!("differ-daemon stopped");
        Ok(())
    }
}

/// Debug mode output for one file: a comma-separated line per record, then
/// the framed error text.
pub fn debug_scan(cycle: &ScanCycle, path: &Path) -> Result<String> {
    let outcome = cycle
        .debug_scan(path)
        .map_err(|e| anyhow::anyhow!("failed to scan {}: {}", path.display(), e))?;

    let mut out = String::new();
    for record in &outcome.records {
        out.push_str(&record.to_string());
        out.push('\n');
    }
    if !outcome.error_text.is_empty() {
        out.push_str(&wrap_file_text(
            &path.display().to_string(),
            &outcome.error_text,
        ));
    }
    Ok(out)
}

/// Wait for SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
