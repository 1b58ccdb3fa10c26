mod cache;
mod commands;
mod config;
mod content;
mod logging;
mod session;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "promptlib")]
#[command(about = "Browse the prompt library from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/promptlib/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Bypass the local cache for this run
  #[arg(long)]
  no_cache: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if args.no_cache {
    config.cache.enabled = false;
  }

  let session = session::Session::from_config(&config)?;
  session.start();

  commands::run(args.command, &session).await
}
