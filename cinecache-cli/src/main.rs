//! Cinecache CLI - Command-line interface
//!
//! Runs the playback server and exposes the transcoding cache for one-off use.

mod commands;

use std::path::PathBuf;

use cinecache_core::tracing_setup::{CliLogLevel, init_tracing};
use clap::Parser;

#[derive(Parser)]
#[command(name = "cinecache")]
#[command(about = "On-demand transcoding cache for a personal film library")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the per-run debug log
    #[arg(long, global = true, default_value = "logs")]
    logs_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), Some(cli.logs_dir.as_path()))?;

    commands::handle_command(cli.command).await
}
