//! Logger bootstrap for the binary.
//!
//! When stderr is an interactive terminal, log lines would fight the
//! progress UI, so they go to a daily-rolled file under the app-data logs
//! directory instead. Piped or redirected stderr gets the logs directly.
//! Filtering follows `UGET_LOG` (`RUST_LOG` syntax), defaulting to `info`.

use std::io::IsTerminal;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber. The returned guard must be held for
/// the process lifetime so buffered log lines are flushed on exit.
pub fn init() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env("UGET_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    if std::io::stderr().is_terminal() {
        let logs = crate::paths::logs_dir();
        if std::fs::create_dir_all(&logs).is_err() {
            // No log directory: fall back to stderr rather than losing logs.
            tracing_subscriber::fmt().with_env_filter(filter).init();
            return None;
        }
        // Daily files named YYYY-MM-DD.log.
        let appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_suffix("log")
            .build(logs);
        let Ok(appender) = appender else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            return None;
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}
