//! Logging infrastructure for daybook.
//!
//! Logs are written to `~/.daybook/logs/daybook.log`, rotated daily.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LoggingConfig, Paths};
use crate::error::DaybookError;

/// File name prefix for the rolling log.
pub const LOG_FILE_NAME: &str = "daybook.log";

/// Initialize the logging system.
///
/// The filter comes from `RUST_LOG` when set, otherwise from `config.level`.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init(config: &LoggingConfig, paths: &Paths) -> Result<LoggingGuard, DaybookError> {
    std::fs::create_dir_all(&paths.logs)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &paths.logs, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();

    tracing::info!(
        log_dir = %paths.logs.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to the test writer).
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the background log writer alive.
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().to_path_buf());

        let _guard = init(&LoggingConfig::default(), &paths).unwrap();
        assert!(paths.logs.exists());
    }
}
