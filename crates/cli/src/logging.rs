//! Console and file logging setup

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::IsTerminal;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize console and file logging.
///
/// Every event goes both to stdout and to `logfile`; only an interactive
/// console gets ANSI colors. The level comes from `RUST_LOG`, defaulting to
/// "info". The returned guard flushes the file writer when dropped, so hold
/// it until exit.
pub fn init(logfile: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(logfile)?);

    let console_layer = fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal());
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

/// Appender that writes to exactly `logfile`, never rotating
fn file_appender(logfile: &Path) -> Result<RollingFileAppender> {
    let name = logfile
        .file_name()
        .ok_or_else(|| anyhow!("Log file path has no file name: {}", logfile.display()))?;
    let dir = match logfile.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory at {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("Failed to open log file at {}", logfile.display()))
}
