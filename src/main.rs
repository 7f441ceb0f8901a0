//! CLI entry point for the release aggregator.

use aggregator_core::config::{CliOverrides, RunConfig, load_config};
use aggregator_core::orchestrator::Orchestrator;
use aggregator_core::snapshot::write_snapshot;
use aggregator_core::user_agent::browser_user_agent_from_env;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod logging;

use cli::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let config = RunConfig::resolve(
        &loaded.config,
        &CliOverrides {
            output: args.output.clone(),
        },
        browser_user_agent_from_env(),
        Utc::now().date_naive(),
    );

    let _log_guard = logging::init(args.verbose, args.quiet, config.log_file.as_deref())?;

    debug!(?args, "CLI arguments parsed");
    info!(
        config_path = ?loaded.path,
        from_file = loaded.loaded_from_file,
        window_start = %config.window.start(),
        window_end = %config.window.end(),
        sources = config.sources.len(),
        "Release aggregator starting"
    );
    debug!(identity = %config.browser_identities.primary, "Using browser identity");

    let orchestrator = Orchestrator::from_config(&config);
    let report = orchestrator.run().await;

    write_snapshot(&report.snapshot, &config.output).with_context(|| {
        format!("Failed to write snapshot to '{}'", config.output.display())
    })?;

    let stats = &report.stats;
    info!(
        releases = report.snapshot.count(),
        pages = stats.pages_fetched,
        failed_passes = stats.failed_passes,
        skipped_passes = stats.skipped_passes,
        candidates = stats.candidates_seen,
        rejected = stats.rejected,
        undated = stats.undated,
        enriched = stats.enriched,
        "Aggregation complete"
    );

    Ok(())
}
