use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::core::config::LogConfig;

const LOG_FOLDER: &str = "notifier";
const LOG_PREFIX: &str = "supervisor-notifier";
const LOG_SUFFIX: &str = "log";

/// Daily files `<dir>/supervisor-notifier.YYYY-MM-DD.log`, keeping at most
/// `keep_days` of them; older ones are pruned when the file rolls over.
fn daily_appender(dir: &Path, keep_days: u64) -> Result<RollingFileAppender> {
    let keep = usize::try_from(keep_days).unwrap_or(usize::MAX).max(1);
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .max_log_files(keep)
        .build(dir)
        .with_context(|| format!("Failed to open log directory {}", dir.display()))
}

/// Tees every line to stdout and to the rolling file under `<dir>/notifier`.
/// File writes happen on a background thread; keep the guard alive until
/// exit so buffered lines are flushed.
pub fn init(config: &LogConfig, verbose: bool) -> Result<WorkerGuard> {
    let appender = daily_appender(&config.dir.join(LOG_FOLDER), config.max_age_days)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(file_writer))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(guard)
}

/// Warnings and errors to stderr only, for one-shot commands.
pub fn init_console() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn log_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn appender_writes_to_a_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = daily_appender(dir.path(), 60).unwrap();
        appender.write_all(b"first\n").unwrap();
        appender.write_all(b"second\n").unwrap();
        appender.flush().unwrap();

        let names = log_files(dir.path());
        assert_eq!(names.len(), 1);
        let name = &names[0];
        assert!(name.starts_with("supervisor-notifier."), "{}", name);
        assert!(name.ends_with(".log"), "{}", name);
        let content = std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn appender_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join(LOG_FOLDER);
        let mut appender = daily_appender(&nested, 0).unwrap();
        appender.write_all(b"line\n").unwrap();
        appender.flush().unwrap();
        assert_eq!(log_files(&nested).len(), 1);
    }

    #[test]
    fn unusable_log_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();
        match daily_appender(&blocker, 60) {
            Ok(_) => panic!("a regular file cannot hold log files"),
            Err(e) => assert!(format!("{:#}", e).contains("Failed to open log directory")),
        }
    }
}
