//! Logging setup

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level unless `verbose` is set, which
/// forces `debug`. When `config.file` is set, events are also appended to that
/// file without ANSI colors; the returned guard must be held until exit so
/// buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.level, verbose)?;

    let (file_layer, guard) = match config.file.as_deref() {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = if config.format == "json" {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| Error::internal(format!("failed to install logger: {e}")))?;

    Ok(guard)
}

fn build_filter(level: &str, verbose: bool) -> Result<EnvFilter> {
    if verbose {
        return Ok(EnvFilter::new("debug"));
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| Error::config(format!("invalid logging.level '{level}': {e}"))),
    }
}

/// Append-only file writer, created up front so a bad path is reported
fn file_appender(path: &str) -> Result<RollingFileAppender> {
    let (dir, name) = split_log_path(path)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|e| Error::config(format!("cannot open logging.file '{path}': {e}")))
}

fn split_log_path(path: &str) -> Result<(&Path, &Path)> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("logging.file '{}' has no file name", path.display())))?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, Path::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path("/var/log/budget-guard.log").unwrap();
        assert_eq!(dir, Path::new("/var/log"));
        assert_eq!(name, Path::new("budget-guard.log"));

        let (dir, name) = split_log_path("guard.log").unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, Path::new("guard.log"));

        assert!(split_log_path("/").is_err());
    }

    #[test]
    fn test_file_appender_writes_to_the_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.log");

        let mut appender = file_appender(path.to_str().unwrap()).unwrap();
        std::io::Write::write_all(&mut appender, b"hello\n").unwrap();
        std::io::Write::flush(&mut appender).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_unusable_log_directory_is_a_config_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().join("guard.log");

        let err = file_appender(path.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_verbose_forces_debug() {
        let filter = build_filter("warn", true).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }
}
