//! Console logging plus the append-only recognition log.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Most verbose level shown on the console.
///
/// A dashboard launched on the same terminal would be scrolled away by
/// routine events, so only warnings and errors reach it then.
pub fn console_level(dashboard_enabled: bool, stderr_is_terminal: bool) -> LevelFilter {
    if dashboard_enabled && stderr_is_terminal {
        LevelFilter::WARN
    } else {
        LevelFilter::TRACE
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr, capped at `console`, and to `log_file` when given. The
/// returned guard must be held until exit so buffered file writes are
/// flushed. A log file that cannot be opened is reported and skipped.
pub fn init(log_file: Option<&Path>, console: LevelFilter) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard, open_error) = match log_file.map(open_append) {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(console))
        .with(file_layer)
        .init();

    if let (Some(path), Some(e)) = (log_file, open_error) {
        tracing::warn!(path = %path.display(), error = %e, "recognition log disabled");
    }
    guard
}

pub(crate) fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
