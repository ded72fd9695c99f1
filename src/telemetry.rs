use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::error::Result;

/// Open `LOG_FILE` for appending, creating it if missing.
pub fn open_log_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber: stdout plus an append-only file at `LOG_FILE`.
/// Keep the returned guard alive for the life of the process or buffered file lines are lost.
pub fn init_logging(cfg: &Config) -> Result<WorkerGuard> {
    let file = open_log_file(Path::new(&cfg.log_file))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let env_filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::io::Write;

    #[test]
    fn log_file_is_appended_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.log");
        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn unopenable_log_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(open_log_file(dir.path()), Err(AppError::Io(_))));
        let missing_parent = dir.path().join("no_such_dir").join("sync.log");
        assert!(matches!(open_log_file(&missing_parent), Err(AppError::Io(_))));
    }
}
