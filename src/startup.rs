//! Startup hooks for the host application.
//!
//! Call [`run_startup`] first thing in `main`, before the database or any
//! window is opened: a staged update replaces files the rest of the
//! application would otherwise hold open. Once the UI is up, call
//! [`pending_update_notice`] to offer a restart for an update that is
//! still staged, and [`offer_update`] after a check finds a new release.

use crate::context::UpdateContext;
use crate::error::{Result, UpdateError};
use crate::progress::{ConfirmationPort, ProgressSink};
use crate::update::applier::{InstallApplier, InstallOutcome, cleanup_old_version};
use crate::update::checker::UpdateInfo;
use crate::update::prepare::{PreparedUpdate, prepare_update};
use crate::update::state::{AutoUpdatePreference, CheckState};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What happened during [`run_startup`].
#[derive(Debug)]
pub struct StartupReport {
    /// Apply result. An error means the installation was not touched.
    pub outcome: std::result::Result<InstallOutcome, UpdateError>,
    /// `true` if a leftover `<App>_old` was removed.
    pub removed_old_version: bool,
}

impl StartupReport {
    /// Message to show the user once the UI is ready, if any.
    pub fn user_message(&self) -> Option<String> {
        match &self.outcome {
            Ok(InstallOutcome::NothingToApply) => None,
            Ok(outcome) => Some(outcome.user_message()),
            Err(e) => Some(format!("A staged update could not be applied: {e}")),
        }
    }
}

/// Apply a staged update, then tidy up.
///
/// The previous version directory is kept when an update was committed in
/// this run, when a rollback failed, and when an interrupted apply left the
/// application directory incomplete (it then holds the only complete copy).
/// Otherwise a leftover `<App>_old` from an earlier update is removed, and
/// only if the application directory still has its entry point.
pub fn run_startup(ctx: &UpdateContext, sink: &dyn ProgressSink) -> StartupReport {
    let outcome = InstallApplier::new(ctx, sink).apply();

    let keep_backup = match &outcome {
        Ok(InstallOutcome::Committed { version, .. }) => {
            info!(version = %version, "running freshly installed version");
            true
        }
        Ok(InstallOutcome::RollbackFailed { .. }) => true,
        Ok(InstallOutcome::RecoveryNeeded { backup_dir, .. }) => {
            error!(backup = %backup_dir.display(), "manual recovery required");
            true
        }
        Ok(_) => false,
        Err(e) => {
            error!(error = %e, "pending update could not be applied");
            false
        }
    };

    let removed_old_version =
        !keep_backup && cleanup_old_version(&ctx.layout, &ctx.config.install.entry_point);
    StartupReport {
        outcome,
        removed_old_version,
    }
}

/// If an update is still staged, ask whether to restart now. Returns the
/// user's answer (`false` when nothing is staged).
pub fn pending_update_notice(ctx: &UpdateContext, port: &dyn ConfirmationPort) -> bool {
    match ctx.pending().read() {
        Ok(Some(marker)) => {
            info!(version = %marker.version, "update staged, offering restart");
            port.confirm_restart(&marker)
        }
        Ok(None) => false,
        Err(e) => {
            error!(error = %e, "cannot read pending update marker");
            false
        }
    }
}

/// Ask whether to install `info`; if confirmed, download and stage it.
///
/// With the `always` preference the question is skipped. A declined
/// release is remembered in the check state so background checks stop
/// offering it.
///
/// # Errors
///
/// Returns the preparation error when staging fails.
pub fn offer_update(
    ctx: &UpdateContext,
    info: &UpdateInfo,
    port: &dyn ConfirmationPort,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Option<PreparedUpdate>> {
    let state_path = ctx.layout.check_state_file();
    let mut state = CheckState::load(&state_path);

    let confirmed = match state.auto_update {
        AutoUpdatePreference::Always => {
            info!(version = %info.version, "automatic updates enabled, staging without asking");
            true
        }
        AutoUpdatePreference::Ask | AutoUpdatePreference::Never => port.confirm_install(info),
    };
    if !confirmed {
        info!(version = %info.version, "update declined");
        state.dismiss(&info.version);
        if let Err(e) = state.save(&state_path) {
            warn!(error = %e, "could not remember declined update");
        }
        return Ok(None);
    }
    prepare_update(ctx, info, sink, cancel).map(Some)
}
