//! Logging setup using tracing.
//!
//! Logs go to a daily-rolling file in the data directory so command output on
//! stdout stays clean. Filtering follows `PROMPTLIB_LOG`, then `RUST_LOG`,
//! defaulting to "warn".

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber.
///
/// The returned guard flushes buffered log lines on drop and must be held
/// until the program exits. Without a usable data directory, logs go to stderr.
pub fn init() -> Result<Option<WorkerGuard>> {
  let filter = env_filter();

  match log_dir() {
    Some(dir) => {
      std::fs::create_dir_all(&dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(&dir, "promptlib.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

      Ok(None)
    }
  }
}

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env("PROMPTLIB_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// e.g. `~/.local/share/promptlib/logs`
fn log_dir() -> Option<PathBuf> {
  let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
  Some(data_dir.join("promptlib").join("logs"))
}
