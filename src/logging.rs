use crate::error::{Result, ShellError};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub struct LogConfig {
    pub log_dir: PathBuf,
    pub file_prefix: String,
    /// Rotated files kept on disk.
    pub max_files: usize,
    /// Filter used when `RUST_LOG` is not set.
    pub default_filter: String,
}

impl LogConfig {
    pub fn new(log_dir: PathBuf, default_filter: &str) -> Self {
        Self {
            log_dir,
            file_prefix: "shellbridge".to_string(),
            max_files: 5,
            default_filter: default_filter.to_string(),
        }
    }
}

/// Installs the global subscriber: a compact stdout layer and a daily rolling
/// file in `log_dir`.
///
/// Targets follow the modules: `icon_cache`, `icon_fetcher`,
/// `bookmark_icons`, `context_menu`, `config`, `win32` and `main`, so
/// `RUST_LOG=icon_fetcher=trace` narrows output to one component.
///
/// The returned guard flushes the file writer and must outlive all logging.
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .max_log_files(config.max_files)
        .build(&config.log_dir)
        .map_err(|e| ShellError::Config(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    let (non_blocking_file, worker_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter.clone());

    let stdout_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!(
        target: "main",
        log_dir = %config.log_dir.display(),
        "Logging initialized"
    );

    Ok(LogGuard {
        _worker_guard: worker_guard,
    })
}

pub struct LogGuard {
    _worker_guard: tracing_appender::non_blocking::WorkerGuard,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        tracing::info!(target: "main", "Flushing logs before shutdown");
    }
}
