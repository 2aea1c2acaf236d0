// src/logging.rs
//! Log output setup
//!
//! Commands that print to the terminal log to stderr. The live dashboard
//! owns the terminal in raw mode, so `track` logs to a file instead.

use crate::error::{Result, TrackerError};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "run_tracker=info,warn";

/// Where log events are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// The returned guard flushes the log file when dropped and must be kept
/// alive until the program exits.
pub fn init_logging(target: &LogTarget) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
        LogTarget::File(path) => {
            let (writer, guard) = file_writer(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
    }
}

fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| TrackerError::Config(format!("Invalid log file {}", path.display())))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn test_file_writer_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run-tracker.log");

        let (writer, guard) = file_writer(&path).unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false));
        tracing::subscriber::with_default(subscriber, || {
            info!(run = 3, "Run saved");
        });
        drop(guard);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Run saved"));
        assert!(text.contains("run=3"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_file_writer_rejects_directory_path() {
        assert!(matches!(file_writer(Path::new("/")), Err(TrackerError::Config(_))));
    }
}
