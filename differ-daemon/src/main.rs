use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use differ_core::config::DifferConfig;
use differ_daemon::cli::DaemonCli;
use differ_daemon::{logging, metrics_server, runner};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = load_config(&cli).await?;
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    if let Some(file) = &cli.file {
        let cycle = runner::build_debug_cycle(&config)?;
        print!("{}", runner::debug_scan(&cycle, file)?);
        return Ok(());
    }

    let cycle = runner::build_cycle(&config)?;

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    tracing::info!(config = %cli.config.display(), "differ-daemon starting");
    let daemon = runner::Runner::new(cycle, Duration::from_secs(config.scan.interval_secs));

    if cli.once {
        let report = daemon.run_once().await?;
        tracing::info!(
            records = report.records_emitted,
            files = report.files_scanned,
            "single cycle complete"
        );
        return Ok(());
    }

    daemon.run().await
}

/// Debug scans of a single file work without a config file.
async fn load_config(cli: &DaemonCli) -> Result<DifferConfig> {
    if cli.file.is_some() && !cli.config.exists() {
        let mut config = DifferConfig::default();
        config.apply_env_overrides();
        return Ok(config);
    }
    DifferConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))
}
