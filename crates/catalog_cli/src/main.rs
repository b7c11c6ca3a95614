mod config;
mod runner;

use std::path::PathBuf;

use clap::Parser;
use harvest_logging::{harvest_info, harvest_warn, LogDestination};
use log::LevelFilter;

/// Harvests catalog listings into a JSON-lines file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// RON configuration file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Log destination: terminal, file or both. Overrides the configuration.
    #[arg(long)]
    log: Option<String>,
    /// Log file used by the file destination.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Output directory. Overrides the configuration.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(&cli.config)?;
    if let Some(output) = cli.output {
        config.output_dir = output;
    }

    let destination = match cli.log.as_deref() {
        Some(name) => LogDestination::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown log destination {name:?}"))?,
        None => config.log_destination,
    };
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_file = cli.log_file.unwrap_or_else(harvest_logging::default_log_path);
    harvest_logging::initialize(destination, level, &log_file);

    if cli.config.exists() {
        harvest_info!(
            "Loaded configuration from {:?} with {} categories",
            cli.config,
            config.categories.len()
        );
    } else {
        harvest_warn!("No configuration at {:?}; using defaults", cli.config);
    }

    let stats = runner::run(&config).await?;
    harvest_info!(
        "Done: {} pages, {} records stored, {} failed, {} cancelled",
        stats.pages,
        stats.records,
        stats.failed,
        stats.cancelled
    );
    Ok(())
}
