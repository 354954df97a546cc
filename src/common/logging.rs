//! Logging and tracing configuration
//!
//! Operator prompts go to stdout, so diagnostics are written to stderr and
//! to a log file that keeps the full record of a session for later triage.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

const LOG_FILE: &str = "rigcheck.log";

/// Keeps the file writer alive; logs are flushed when this is dropped
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    /// Where the session log is written, if file logging could be set up
    pub log_path: Option<PathBuf>,
}

/// Initialize tracing (stderr + session log file)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies; `verbose`
/// raises this crate to DEBUG.
pub fn init(verbose: bool) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("rigcheck=debug,warn")
        } else {
            EnvFilter::new("rigcheck=info,warn")
        }
    });

    let log_dir = match paths::ensure_log_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Warning: Could not create log directory: {}", e);
            None
        }
    };

    let (subscriber, guard) = subscriber(filter, log_dir.as_deref());
    subscriber.init();
    guard
}

/// Build the subscriber stack; the file layer is left out when there is no
/// log directory
fn subscriber(
    filter: EnvFilter,
    log_dir: Option<&Path>,
) -> (impl tracing::Subscriber + Send + Sync + 'static, LoggingGuard) {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            let guard = LoggingGuard {
                _file: Some(worker),
                log_path: Some(dir.join(LOG_FILE)),
            };
            (Some(layer), guard)
        }
        None => (
            None,
            LoggingGuard {
                _file: None,
                log_path: None,
            },
        ),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer);
    (subscriber, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layer_writes_session_log() {
        let dir = tempfile::tempdir().unwrap();
        let (subscriber, guard) = subscriber(EnvFilter::new("info"), Some(dir.path()));
        assert_eq!(guard.log_path, Some(dir.path().join(LOG_FILE)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("session started against rig-7");
        });
        drop(guard);

        let log = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(log.contains("session started against rig-7"));
    }

    #[test]
    fn test_stderr_only_without_log_dir() {
        let (subscriber, guard) = subscriber(EnvFilter::new("info"), None);
        assert!(guard.log_path.is_none());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("no file layer");
        });
    }
}
