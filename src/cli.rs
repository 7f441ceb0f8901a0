//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Aggregate upcoming and recent metal releases into one snapshot.
///
/// Reads every enabled source politely (robots.txt, crawl delay), merges the
/// same release seen under different sources and genres, and writes a JSON
/// snapshot. Runs to completion even when some sources fail.
#[derive(Parser, Debug)]
#[command(name = "release-aggregator")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to a TOML config file (default: $XDG_CONFIG_HOME/release-aggregator/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Snapshot output path (overrides the config file)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
