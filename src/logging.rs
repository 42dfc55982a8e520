//! Log setup for the daemon and relay binaries

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::error::{LoftusError, Result};

/// Non-blocking writer appending to `<log_dir>/<name>`.
///
/// Lines still buffered are lost if the guard is dropped early; hold it
/// until exit.
pub fn file_writer(log_dir: &Path, name: &str) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(log_dir)
        .map_err(|e| {
            LoftusError::Config(format!(
                "Error opening log file {}: {}",
                log_dir.join(name).display(),
                e
            ))
        })?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber: `<log_dir>/<name>` or stdout
pub fn init_logging(config: &Config, name: &str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.stdout {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stdout))
            .with(filter)
            .init();
        return Ok(None);
    }

    let (writer, guard) = file_writer(&config.log_path(), name)?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    Ok(Some(guard))
}
