//! Package download with retry, backoff, and cancellation.
//!
//! The body streams into `<dest>.tmp` in 64 KiB chunks. Only a complete
//! download is renamed into place, and the temp file is removed after
//! every failed attempt, so an interrupted download never leaves a
//! half-written package behind.

use crate::config::DownloadConfig;
use crate::error::{Result, UpdateError};
use crate::progress::{ProgressSink, Stage};
use crate::update::transport::{Transport, UreqTransport};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CHUNK_SIZE: usize = 64 * 1024;
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Downloads packages over a [`Transport`].
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    config: DownloadConfig,
    cancel: CancellationToken,
}

impl Downloader {
    /// Create a downloader over an explicit transport.
    pub fn new(transport: Arc<dyn Transport>, config: DownloadConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a downloader backed by `ureq`.
    pub fn from_config(config: &DownloadConfig, connect_timeout: Duration) -> Self {
        let read_timeout = Duration::from_secs(config.read_timeout_secs.max(1));
        Self::new(
            Arc::new(UreqTransport::new(connect_timeout, read_timeout)),
            config.clone(),
        )
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Download`] after the last failed attempt, or
    /// [`UpdateError::Cancelled`] if the token fires. In both cases no temp
    /// file is left on disk.
    pub fn download(&self, url: &str, dest: &Path, sink: &dyn ProgressSink) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(dest);
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if self.cancel.is_cancelled() {
                remove_if_exists(&tmp);
                return Err(UpdateError::Cancelled);
            }

            info!(url, attempt = attempt + 1, of = attempts, "downloading update");
            let started = Instant::now();
            match self.attempt(url, &tmp, sink) {
                Ok(bytes) => {
                    if let Err(e) = move_into_place(&tmp, dest) {
                        remove_if_exists(&tmp);
                        warn!(dest = %dest.display(), error = %e, "cannot move download into place");
                        return Err(e.into());
                    }
                    info!(
                        dest = %dest.display(),
                        bytes,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "download complete"
                    );
                    return Ok(bytes);
                }
                Err(UpdateError::Cancelled) => {
                    remove_if_exists(&tmp);
                    info!(url, "download cancelled");
                    return Err(UpdateError::Cancelled);
                }
                Err(e) => {
                    remove_if_exists(&tmp);
                    warn!(url, attempt = attempt + 1, error = %e, "download attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts && !self.sleep(self.config.backoff_for(attempt)) {
                return Err(UpdateError::Cancelled);
            }
        }

        Err(UpdateError::Download {
            attempts,
            last_error,
        })
    }

    fn attempt(&self, url: &str, tmp: &Path, sink: &dyn ProgressSink) -> Result<u64> {
        let resp = self.transport.get(url)?;
        let total = resp.content_length.unwrap_or(0);
        let mut reader = resp.body;
        let mut file = std::fs::File::create(tmp)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut downloaded: u64 = 0;

        sink.on_progress(Stage::Downloading, 0, total);
        loop {
            if self.cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            let n = reader
                .read(&mut buf)
                .map_err(|e| UpdateError::Network(format!("download read error: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            downloaded += n as u64;
            sink.on_progress(Stage::Downloading, downloaded, total);
        }
        file.sync_all()?;

        if total > 0 && downloaded != total {
            return Err(UpdateError::Network(format!(
                "download truncated: got {downloaded} of {total} bytes"
            )));
        }
        Ok(downloaded)
    }

    /// Sleep for `delay`, waking early on cancellation. Returns `false` if
    /// cancelled.
    fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

/// Temp file used while downloading to `dest`: the same name with `.tmp`
/// appended.
pub fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn move_into_place(tmp: &Path, dest: &Path) -> std::io::Result<()> {
    if dest.exists() {
        std::fs::remove_file(dest)?;
    }
    std::fs::rename(tmp, dest)
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}
