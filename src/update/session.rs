//! Background checking and staging.
//!
//! The UI thread never blocks on the network: checks run on tokio's
//! blocking pool and preparation runs on a dedicated worker thread that
//! streams progress over a channel.

use crate::context::UpdateContext;
use crate::error::{Result, UpdateError};
use crate::progress::{ChannelSink, ProgressEvent};
use crate::update::checker::UpdateInfo;
use crate::update::downloader::Downloader;
use crate::update::prepare::{PreparedUpdate, prepare_update_with};
use crate::update::state::{AutoUpdatePreference, CheckState};
use std::path::PathBuf;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Check for an update if the persisted state says a check is due.
///
/// Returns `None` when checks are disabled, the last check is recent, no
/// newer version exists, or the user dismissed the newer version.
pub async fn check_in_background(ctx: &UpdateContext) -> Option<UpdateInfo> {
    let state_path = ctx.layout.check_state_file();
    let state = CheckState::load(&state_path);

    if state.auto_update == AutoUpdatePreference::Never {
        debug!("automatic update checks disabled");
        return None;
    }
    if !state.check_is_stale(ctx.config.check.check_interval_hours) {
        debug!("update check not due yet");
        return None;
    }

    let checker = ctx.checker();
    let current = ctx.current_version.clone();
    let info = match tokio::task::spawn_blocking(move || checker.check(&current)).await {
        Ok(info) => info,
        Err(e) => {
            debug!("update check task failed: {e}");
            return None;
        }
    };

    let mut new_state = state;
    new_state.mark_checked();
    let dismissed = info
        .as_ref()
        .is_some_and(|i| new_state.is_dismissed(&i.version));
    persist_state(new_state, state_path).await;

    match info {
        Some(info) if !dismissed => {
            info!(version = %info.version, "update available");
            Some(info)
        }
        _ => None,
    }
}

/// Save `state` on the blocking pool. Returns `false` if it was not
/// written; the next check then simply runs earlier than scheduled.
async fn persist_state(state: CheckState, path: PathBuf) -> bool {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || state.save(&path)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(path = %shown, error = %e, "could not save update check state");
            false
        }
        Err(e) => {
            warn!(path = %shown, error = %e, "update check state task failed");
            false
        }
    }
}

/// Preparation running on a worker thread.
pub struct UpdateSession {
    cancel: CancellationToken,
    events: crossbeam_channel::Receiver<ProgressEvent>,
    handle: JoinHandle<Result<PreparedUpdate>>,
}

impl UpdateSession {
    /// Start staging `info` with the context's downloader.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn spawn(ctx: UpdateContext, info: UpdateInfo) -> Result<Self> {
        let downloader = ctx.downloader();
        Self::spawn_with(ctx, info, downloader, CancellationToken::new())
    }

    /// Start staging with an explicit downloader and cancellation token.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn spawn_with(
        ctx: UpdateContext,
        info: UpdateInfo,
        downloader: Downloader,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (sink, events) = ChannelSink::new();
        let worker_cancel = cancel.clone();
        let handle = std::thread::Builder::new()
            .name("airdocs-update".to_owned())
            .spawn(move || {
                let downloader = downloader.with_cancellation(worker_cancel.clone());
                prepare_update_with(&ctx, &downloader, &info, &sink, &worker_cancel)
            })?;
        Ok(Self {
            cancel,
            events,
            handle,
        })
    }

    /// Progress events from the worker.
    pub fn events(&self) -> &crossbeam_channel::Receiver<ProgressEvent> {
        &self.events
    }

    /// Ask the worker to stop at the next chunk or archive entry.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its result.
    ///
    /// # Errors
    ///
    /// Returns the preparation error, [`UpdateError::Cancelled`] after
    /// [`UpdateSession::cancel`], or an error if the worker panicked.
    pub fn join(self) -> Result<PreparedUpdate> {
        self.handle
            .join()
            .map_err(|_| UpdateError::Install("update worker panicked".to_owned()))?
    }
}
