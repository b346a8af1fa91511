//! qc - query coordinator CLI
//!
//! Issues bursts of concurrent requests against built-in providers and shows
//! how they were coalesced.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use querycoord::cli::{Cli, Command, OutputFormat};
use querycoord::config::{Config, LoadedConfig};
use querycoord::coordinator::CoordinatorMetrics;
use querycoord::providers::{StorageInfo, StorageProvider};
use querycoord::registry::Registry;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = querycoord::cli::get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve config before logging so its log-level can apply; errors are reported after setup
    let loaded = Config::resolve(cli.config.as_ref());
    let config_log_level = loaded.as_ref().ok().and_then(|l| l.config.log_level.clone());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let LoadedConfig { config, source } = loaded.context("Failed to load configuration")?;
    info!(?source, "Configuration loaded");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Storage { paths, burst, format } => cmd_storage(&config, paths, burst, format).await,
        Command::ShowConfig => cmd_show_config(&config, source.as_deref()),
    }
}

#[derive(Serialize)]
struct StorageReport<'a> {
    info: &'a StorageInfo,
    requests: usize,
    metrics: &'a CoordinatorMetrics,
}

async fn cmd_storage(config: &Config, paths: Vec<PathBuf>, burst: usize, format: OutputFormat) -> Result<()> {
    debug!(?paths, burst, %format, "cmd_storage: called");
    let paths = if paths.is_empty() {
        config.storage.paths.clone()
    } else {
        paths
    };
    let burst = burst.max(1);

    let mut registry = Registry::new(config.coordinator.clone());
    let handle = registry.get_or_create_with(|| StorageProvider::new(paths));

    let results = join_all((0..burst).map(|_| handle.get())).await;
    let metrics = handle.metrics().await.context("Failed to read coordinator metrics")?;
    registry.shutdown_all().await;

    let mut snapshots = Vec::with_capacity(results.len());
    for result in results {
        snapshots.push(result.context("Storage query failed")?);
    }
    let info = snapshots.first().ok_or_else(|| eyre!("No storage snapshot returned"))?;
    info!(requests = burst, dispatches = metrics.dispatches, "Storage burst complete");

    match format {
        OutputFormat::Json => {
            let report = StorageReport {
                info,
                requests: burst,
                metrics: &metrics,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_storage_text(info, burst, &metrics),
    }
    Ok(())
}

fn print_storage_text(info: &StorageInfo, requests: usize, metrics: &CoordinatorMetrics) {
    println!("{}", "Storage".bold());
    for unit in &info.units {
        let pct = unit.usage_ratio() * 100.0;
        let usage = format!("{:5.1}% used", pct);
        let usage = if pct >= 90.0 {
            usage.red()
        } else if pct >= 75.0 {
            usage.yellow()
        } else {
            usage.green()
        };
        println!(
            "  {:<30} {}  {} free of {}",
            unit.path.display().to_string().cyan(),
            usage,
            format_bytes(unit.available_bytes),
            format_bytes(unit.capacity_bytes)
        );
    }
    if let Some(at) = info.queried_at {
        println!("  queried at {}", at.to_rfc3339());
    }

    println!();
    println!("{}", "Coordinator".bold());
    println!("  requests:   {}", requests);
    println!("  queries:    {}", metrics.dispatches);
    println!("  coalesced:  {} ({:.0}%)", metrics.coalesced, metrics.coalescing_ratio() * 100.0);
    println!("  failures:   {}", metrics.failures);
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn cmd_show_config(config: &Config, source: Option<&Path>) -> Result<()> {
    debug!(?source, "cmd_show_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    match source {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: defaults"),
    }
    print!("{}", yaml);
    Ok(())
}
