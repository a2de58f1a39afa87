//! Tracing setup for the updater.
//!
//! Events go to stderr and to `<user_dir>/logs/updater.log`, so a failed
//! apply that happened before any window opened can still be diagnosed.
//!
//! While a staged update is being applied nothing under the installation
//! may be held open, so that phase logs through [`stderr_only`] and the
//! file layer is installed once the tree is settled.

use crate::error::{Result, UpdateError};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Name of the updater log file inside the logs directory.
pub const UPDATER_LOG_NAME: &str = "updater.log";

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "airdocs_updater=info";

/// Path of the updater log for a logs directory.
pub fn log_file(logs_dir: &Path) -> PathBuf {
    logs_dir.join(UPDATER_LOG_NAME)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Subscriber writing to stderr only.
pub fn stderr_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
}

/// Run `f` on this thread with [`stderr_subscriber`] as the default. No
/// file is opened.
pub fn stderr_only<T>(f: impl FnOnce() -> T) -> T {
    tracing::subscriber::with_default(stderr_subscriber(), f)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(logs_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::never(logs_dir, UPDATER_LOG_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| UpdateError::Config(format!("cannot install log subscriber: {e}")))?;

    Ok(guard)
}
