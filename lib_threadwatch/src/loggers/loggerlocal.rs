use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
/// # Logging Options
///
/// Where and how verbosely the process logs.
pub struct LoggingOptions {
    /// Prefix of the daily log files, usually the binary name.
    pub app_name: String,
    /// Directory holding the JSON log files.
    pub log_dir: PathBuf,
    /// Filter used when `RUST_LOG` is not set, e.g. `info` or `lib_threadwatch=debug`.
    pub level: String,
    /// Number of log files kept at startup, the newest first.
    pub keep_files: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            app_name: "threadwatch".to_string(),
            log_dir: PathBuf::from("logs"),
            level: "info".to_string(),
            keep_files: 7,
        }
    }
}

/// Installs the global `tracing` subscriber: ANSI console output plus JSON
/// lines in a daily rolling file.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for as long as the process logs.
///
/// # Errors
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging(options: &LoggingOptions) -> Result<WorkerGuard> {
    fs::create_dir_all(&options.log_dir)?;
    let removed = cleanup_old_logs(&options.log_dir, &options.app_name, options.keep_files)?;

    let file_appender = rolling::daily(&options.log_dir, &options.app_name);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(std::io::Error::other)?;

    info!(
        dir = %options.log_dir.display(),
        removed,
        "logging initialized with level: {}",
        options.level
    );
    Ok(guard)
}

/// Deletes all but the `keep` most recently modified files in `log_dir`
/// whose name starts with `prefix`. Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &Path, prefix: &str, keep: usize) -> Result<usize> {
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.path())
        })
        .collect();

    // Newest first; equal timestamps fall back to the name, which embeds the date.
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_files_of_the_app() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=5 {
            fs::write(dir.path().join(format!("threadwatch.2026-01-0{day}")), "{}").unwrap();
        }
        fs::write(dir.path().join("other.2026-01-01"), "{}").unwrap();

        let removed = cleanup_old_logs(dir.path(), "threadwatch", 2).unwrap();
        assert_eq!(removed, 3);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left.len(), 3);
        assert!(left.contains(&"other.2026-01-01".to_string()));
    }
}
