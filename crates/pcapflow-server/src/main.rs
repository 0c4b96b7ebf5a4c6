//! pcapflow offline inspection runner

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pcapflow_core::config::online_processor_count;
use pcapflow_core::{Config, ConfigKey, TopologyError};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// pcapflow - multi-threaded offline packet inspection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run mode: single, auto or autofp (overrides `runmode`)
    #[arg(long)]
    runmode: Option<String>,

    /// Capture file to read (overrides `pcap-file.file`)
    #[arg(short = 'r', long)]
    pcap: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Pin workers to CPUs and set thread priorities
    #[arg(long)]
    affinity: bool,

    /// Directory for alert logs (overrides `default-log-dir`)
    #[arg(short, long)]
    log_dir: Option<PathBuf>,

    /// Write per-worker counters as JSON after the run
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<TopologyError>() {
                Some(topology) => error!(step = %topology.step(), "startup failed: {e:#}"),
                None => error!("startup failed: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    info!("Starting pcapflow {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .map_err(TopologyError::from)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::new(),
    };
    if let Some(mode) = &args.runmode {
        config.set(ConfigKey::RunMode, mode.as_str());
    }
    if let Some(pcap) = &args.pcap {
        config.set(ConfigKey::PcapFile, pcap.to_string_lossy().into_owned());
    }
    if let Some(dir) = &args.log_dir {
        config.set(ConfigKey::DefaultLogDir, dir.to_string_lossy().into_owned());
    }
    if args.affinity {
        config.set(ConfigKey::SetCpuAffinity, true);
    }

    let cpu_count = online_processor_count();
    info!(cpu_count, "detected CPUs");

    let report = pcapflow_server::run(&config, cpu_count)?;
    if let Some(path) = &args.stats_json {
        pcapflow_server::write_stats(&report, path)?;
    }
    Ok(())
}
