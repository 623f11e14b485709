use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use nestsync::{commands, config, logging};

#[derive(Parser, Debug)]
#[command(name = "nestsync")]
#[command(about = "Offline-first sync client for courses, teachers and study materials")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/nestsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(&config::data_dir()?.join("logs"))?;
  tracing::debug!(backend = %config.backend.url, "starting");

  commands::run(args.command, &config).await
}
