use color_eyre::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "SOSMED_LOG";

/// Install the global subscriber: a daily-rolling file under `log_dir`, plus
/// warnings and errors on stderr.
///
/// Log lines are written by a background thread; keep the returned guard
/// alive until exit or buffered lines are lost.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)?;

  let appender = tracing_appender::rolling::daily(log_dir, "sosmed.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_ansi(false);
  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr.with_max_level(tracing::Level::WARN))
    .compact();

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()?;

  Ok(guard)
}
