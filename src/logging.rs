//! Tracing setup for the `asl-*` tools.
//!
//! Events go to stdout and to `logs/<tool>_<timestamp>.log` in the app
//! directory. Each run of a tool opens a new file; only the newest
//! [`MAX_LOG_FILES`] of that tool are kept, other tools' files are left alone.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

/// Log files kept per tool.
pub const MAX_LOG_FILES: usize = 10;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Log directory unavailable: {0}")]
    AppDir(#[from] AppDirError),
    #[error("Failed to create log file at {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Listing or deleting older log files failed.
    #[error("Failed to prune logs in {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log file timestamp: {0}")]
    FormatTime(time::error::Format),
    #[error("Failed to install tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber for `tool` (e.g. `asl-download`).
///
/// `RUST_LOG` controls the filter, defaulting to `info`. Calling it again is a
/// no-op. Binaries print the error and carry on without a log file.
pub fn init(tool: &str) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let log_dir = app_dirs::logs_dir()?;
    let (log_path, file_name) = create_log_file(&log_dir, tool, now_local_or_utc())?;
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&log_dir, file_name));
    prune_old_logs(&log_dir, tool, MAX_LOG_FILES)?;

    let timer = build_timer();
    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_timer(timer.clone())
        .with_writer(std::io::stdout);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(file_writer);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("{tool} logging to {}", log_path.display());
    Ok(())
}

/// Create this run's empty log file and return its path and file name.
fn create_log_file(
    dir: &Path,
    tool: &str,
    now: OffsetDateTime,
) -> Result<(PathBuf, String), LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    let file_name = format!("{tool}_{stamp}.log");
    let path = dir.join(&file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::LogFile {
            path: path.clone(),
            source,
        })?;
    Ok((path, file_name))
}

fn is_tool_log(path: &Path, tool: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("log")
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.strip_prefix(tool).is_some_and(|rest| rest.starts_with('_')))
}

fn prune_old_logs(dir: &Path, tool: &str, keep: usize) -> Result<(), LoggingError> {
    let prune_error = |source| LoggingError::Prune {
        path: dir.to_path_buf(),
        source,
    };
    let mut logs: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)
        .map_err(prune_error)?
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .map(|entry| entry.path())
        .filter(|path| is_tool_log(path, tool))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    logs.sort();
    let excess = logs.len().saturating_sub(keep);
    for (_, path) in logs.into_iter().take(excess) {
        fs::remove_file(&path).map_err(prune_error)?;
    }
    Ok(())
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn log_file_is_created_with_tool_and_timestamp() {
        let dir = tempdir().unwrap();
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let (path, name) = create_log_file(dir.path(), "asl-classifier", fixed).unwrap();
        assert_eq!(name, "asl-classifier_2023-11-14_22-13-20.log");
        assert_eq!(path, dir.path().join(&name));
        assert!(path.is_file());
    }

    #[test]
    fn tool_match_requires_exact_prefix() {
        assert!(is_tool_log(Path::new("asl-predict_1.log"), "asl-predict"));
        assert!(!is_tool_log(Path::new("asl-predictor_1.log"), "asl-predict"));
        assert!(!is_tool_log(Path::new("asl-predict_1.txt"), "asl-predict"));
    }

    #[test]
    fn prune_only_touches_files_of_the_same_tool() {
        let dir = tempdir().unwrap();
        for idx in 0..12 {
            touch(&dir.path().join(format!("asl-classifier_{idx}.log")));
            thread::sleep(Duration::from_millis(10));
        }
        touch(&dir.path().join("asl-download_0.log"));

        prune_old_logs(dir.path(), "asl-classifier", 10).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        let own = names
            .iter()
            .filter(|name| name.starts_with("asl-classifier_"))
            .count();
        assert_eq!(own, 10);
        assert!(names.iter().any(|name| name == "asl-download_0.log"));
        assert!(!names.iter().any(|name| name == "asl-classifier_0.log"));
    }
}
