//! Tracing setup: stderr, journald on Linux, or a daily rolling file.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "TAGSIFT_LOG";

/// Where log records go.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Write to stderr instead of journald / file
    pub stderr: bool,
    /// Directory for the rolling file (default: local data dir)
    pub dir: Option<PathBuf>,
}

// Keeps the non-blocking file writer flushing until exit
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagsift")
        .join("logs")
}

/// Initialize the logging system. Call once at startup.
///
/// The level comes from `TAGSIFT_LOG` (`debug`, `info`, `warn`, ...). With
/// `stderr` set the default is `debug`, otherwise `info`. Without `stderr`,
/// Linux hosts log to systemd-journald when it is reachable and everything
/// else falls back to `tagsift.log` in the log directory.
pub fn init(options: LogOptions) -> Result<()> {
    if options.stderr {
        tracing_subscriber::registry()
            .with(env_filter("debug"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter("info"))
                .with(journald_layer)
                .try_init()?;
            tracing::debug!("logging to journald");
            return Ok(());
        }
    }

    let log_dir = options.dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tagsift.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::debug!(dir = %log_dir.display(), "logging to file");
    Ok(())
}
