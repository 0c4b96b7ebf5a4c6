//! Drives one offline run: configuration → topology → join → summary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use pcapflow_core::{build, BoundContext, Config, TopologyConfig, TopologyError, TopologyReport};
use tracing::info;

use crate::rules::{DetectContext, RuleError};
use crate::stages;

/// Config key holding an inline rule list.
pub const RULES_KEY: &str = "rules";
/// Config key naming a YAML rule file.
pub const RULE_FILE_KEY: &str = "rule-file";

/// Builds the detection context from `config`.
///
/// Inline `rules` take precedence over `rule-file`. With neither, the
/// context is empty and detection raises no alerts.
///
/// # Errors
///
/// Returns an error if the rules cannot be read or compiled.
pub fn detect_context(config: &Config) -> Result<DetectContext, RuleError> {
    if let Some(inline) = config.get(RULES_KEY) {
        return DetectContext::from_value(inline);
    }
    match config.get(RULE_FILE_KEY).and_then(serde_yaml::Value::as_str) {
        Some(path) => DetectContext::load(path),
        None => {
            tracing::warn!("no detection rules configured");
            Ok(DetectContext::default())
        }
    }
}

/// Runs the capture named in `config` to completion on `cpu_count` CPUs.
///
/// # Errors
///
/// Returns the first configuration, construction or worker failure. A
/// [`TopologyError`] in the chain names the failed step.
pub fn run(config: &Config, cpu_count: usize) -> Result<TopologyReport> {
    let topology_config =
        TopologyConfig::from_config(config, cpu_count).map_err(TopologyError::from)?;
    let rules = Arc::new(detect_context(config).context("failed to load detection rules")?);
    ensure_dir(&topology_config.log_dir)?;

    let registry = stages::registry(Arc::clone(&rules));
    let detect_ctx: BoundContext = rules;
    let topology = build(
        topology_config.strategy,
        &topology_config,
        &registry,
        detect_ctx,
    )?;
    info!(
        strategy = %topology.strategy(),
        workers = topology.worker_count(),
        queues = topology.queues().len(),
        offline = topology.is_offline(),
        "topology running"
    );

    let report = topology.join()?;
    log_summary(&report);
    Ok(report)
}

/// Logs per-worker and per-group counters.
pub fn log_summary(report: &TopologyReport) {
    for worker in &report.workers {
        info!(
            worker = %worker.info.name,
            received = worker.counters.received,
            processed = worker.counters.processed,
            dropped = worker.counters.dropped,
            errors = worker.counters.errors,
            "worker summary"
        );
    }
    for (group, counters) in &report.groups {
        info!(
            group = %group,
            received = counters.received,
            processed = counters.processed,
            dropped = counters.dropped,
            errors = counters.errors,
            "group summary"
        );
    }
    info!(
        strategy = %report.strategy,
        delivered = report.delivered(),
        "run complete"
    );
}

/// Writes `report` as pretty JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_stats(report: &TopologyReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write stats to {}", path.display()))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    Ok(())
}
