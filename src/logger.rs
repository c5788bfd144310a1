use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_core::{Level, LevelFilter, Metadata};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

use crate::error::{Error, Result};

/// Installs the global subscriber: progress on stderr and, when `file_path` is given, a
/// full log in that file.
///
/// Does nothing if a global subscriber is already configured.
pub fn install(file_path: Option<&str>) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(not_noisy));

    let file = match file_path {
        Some(file_path) => {
            let path = Path::new(file_path);
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::InvalidLogPath(file_path.to_string()))?;
            let writer = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file_name.to_string_lossy())
                .build(path.parent().unwrap_or_else(|| Path::new(".")))
                .map_err(|err| Error::LogFile(format!("{file_path}: {err}")))?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(LevelFilter::DEBUG)
                    .with_filter(filter_fn(not_noisy)),
            )
        }
        None => None,
    };

    if registry().with(console).with(file).try_init().is_ok() {
        if let Some(file_path) = file_path {
            update_panic_hook(file_path);
        }
    }

    Ok(())
}

fn not_noisy(metadata: &Metadata<'_>) -> bool {
    !is_noisy(metadata.module_path(), *metadata.level())
}

fn is_noisy(module_path: Option<&str>, level: Level) -> bool {
    // The wgpu crate is logging too much, so we skip `info` level.
    matches!(module_path, Some(path) if path.starts_with("wgpu") && level >= Level::INFO)
}

fn update_panic_hook(file_path: &str) {
    let hook = std::panic::take_hook();
    let file_path = file_path.to_owned();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {}", info);
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the training logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_without_file_name() {
        assert!(matches!(
            install(Some("/")),
            Err(Error::InvalidLogPath(path)) if path == "/"
        ));
    }

    #[test]
    fn unwritable_log_directory_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().join("logs").join("train.log");

        let result = install(Some(path.to_str().unwrap()));

        assert!(matches!(result, Err(Error::LogFile(_))));
    }

    #[test]
    fn wgpu_info_is_filtered_out() {
        assert!(is_noisy(Some("wgpu_core::device"), Level::INFO));
        assert!(!is_noisy(Some("wgpu_core::device"), Level::DEBUG));
        assert!(!is_noisy(Some("mnist_train::training"), Level::INFO));
        assert!(!is_noisy(None, Level::INFO));
    }
}
