use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Used when `RUST_LOG` is unset. HTTP internals are only interesting
/// when something is wrong.
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Installs the global subscriber: stderr always, plus a rotated `log_file`
/// when set.
pub fn init_tracing(
    log_file: Option<&Path>,
    max_files: usize,
) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let file_layer = match log_file {
        Some(path) => {
            let appender = rolling_appender(path, max_files)?;
            Some(fmt::layer().with_ansi(false).with_writer(appender))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

/// Daily-rotated writer for `path`. `logs/mover.log` becomes
/// `logs/mover.2026-10-19.log`; only the newest `max_files` are kept.
pub fn rolling_appender(
    path: &Path,
    max_files: usize,
) -> anyhow::Result<RollingFileAppender> {
    let prefix = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| {
            format!("log file {} has no usable file name", path.display())
        })?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).with_context(|| {
        format!("failed to create log directory {}", directory.display())
    })?;

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(max_files);
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        builder = builder.filename_suffix(extension);
    }
    builder
        .build(directory)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn log_names(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn log_file_gets_a_dated_name_in_a_created_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("plugins/logs");

        let mut appender =
            rolling_appender(&logs.join("mover.log"), 30).expect("appender");
        appender.write_all(b"cycle finished\n").unwrap();
        appender.flush().unwrap();

        let names = log_names(&logs);
        assert_eq!(names.len(), 1, "{names:?}");
        let name = &names[0];
        assert!(name.starts_with("mover."), "{name}");
        assert!(name.ends_with(".log"), "{name}");
        assert_ne!(name, "mover.log");
        assert_eq!(
            fs::read_to_string(logs.join(name)).unwrap(),
            "cycle finished\n"
        );
    }

    #[test]
    fn extensionless_log_file_keeps_its_stem() {
        let dir = tempfile::tempdir().unwrap();

        let mut appender =
            rolling_appender(&dir.path().join("tiermover"), 3).expect("appender");
        appender.write_all(b"x").unwrap();
        appender.flush().unwrap();

        let names = log_names(dir.path());
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names[0].starts_with("tiermover."), "{}", names[0]);
    }

    #[test]
    fn log_path_without_a_file_name_is_rejected() {
        assert!(rolling_appender(Path::new("/"), 3).is_err());
    }
}
