//! Progress and confirmation interfaces between the update engine and UI.
//!
//! The engine never talks to a UI toolkit directly. It reports through a
//! [`ProgressSink`] and asks questions through a [`ConfirmationPort`], so
//! the same code drives the CLI (indicatif) and a desktop shell.

use crate::update::applier::InstallOutcome;
use crate::update::checker::UpdateInfo;
use crate::update::pending::PendingUpdateMarker;

/// Stage of the update pipeline a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Querying the manifest or release feed.
    Checking,
    /// Streaming the package to disk (`current`/`total` are bytes).
    Downloading,
    /// Hashing the package (`current`/`total` are bytes).
    Verifying,
    /// Unpacking the package (`current`/`total` are archive entries).
    Extracting,
    /// Moving the live install aside.
    BackingUp,
    /// Copying the new tree into place.
    Copying,
    /// Carrying user data into the new tree.
    RestoringUserData,
    /// Checking the new install before commit.
    VerifyingInstall,
    /// Restoring the previous install after a failure.
    RollingBack,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::BackingUp => "backing up",
            Self::Copying => "copying",
            Self::RestoringUserData => "restoring user data",
            Self::VerifyingInstall => "verifying install",
            Self::RollingBack => "rolling back",
        };
        f.write_str(label)
    }
}

/// A single progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub current: u64,
    /// Zero when the total is unknown.
    pub total: u64,
}

/// Callback type for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Receiver of progress and outcome notifications.
///
/// Implementations must be cheap and must not block: events arrive from
/// worker threads at chunk granularity.
pub trait ProgressSink: Send + Sync {
    /// Report progress within a stage.
    fn on_progress(&self, stage: Stage, current: u64, total: u64);

    /// Report the final result of an apply.
    fn on_outcome(&self, _outcome: &InstallOutcome) {}
}

/// Questions the engine asks the user.
pub trait ConfirmationPort {
    /// Ask whether an available update should be downloaded and staged.
    fn confirm_install(&self, info: &UpdateInfo) -> bool;

    /// Ask whether to restart now to apply an already staged update.
    fn confirm_restart(&self, marker: &PendingUpdateMarker) -> bool;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _stage: Stage, _current: u64, _total: u64) {}
}

impl ProgressSink for ProgressCallback {
    fn on_progress(&self, stage: Stage, current: u64, total: u64) {
        self(ProgressEvent {
            stage,
            current,
            total,
        });
    }
}

/// Sink that forwards events over a channel to another thread (typically
/// the UI thread).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, crossbeam_channel::Receiver<ProgressEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, stage: Stage, current: u64, total: u64) {
        // A dropped receiver means nobody is watching; progress is advisory.
        let _ = self.tx.send(ProgressEvent {
            stage,
            current,
            total,
        });
    }
}
