//! Applying a staged update at startup.
//!
//! The live tree is renamed to `<App>_old`, the extracted package is copied
//! into a fresh `<App>`, user data is carried over, and the entry point is
//! checked. Any failure after the backup rename restores `<App>_old`. When
//! the routine returns, either the new tree or the previous tree is
//! complete at the application path; if even that could not be achieved
//! the outcome says so and names both directories.
//!
//! This runs before anything else opens files under the install and is not
//! cancellable.

use crate::app_dirs::InstallLayout;
use crate::context::UpdateContext;
use crate::error::{Result, UpdateError};
use crate::progress::{ProgressSink, Stage};
use crate::update::fs_ops::{
    Moved, archive_stale_backup, copy_tree_with_progress, count_files, remove_tree_best_effort,
    rename_or_copy,
};
use crate::update::history::UpdateHistoryRecord;
use crate::update::pending::{PendingUpdateMarker, PendingUpdateState};
use crate::update::user_data::restore_user_data;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Where the apply sequence is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    MarkerFound,
    BackingUp,
    Copying,
    RestoringUserData,
    Verifying,
    Committed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

/// Result of [`InstallApplier::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No marker was present.
    NothingToApply,
    /// The new version is live. The previous tree is kept at `backup_dir`.
    Committed {
        version: String,
        app_dir: PathBuf,
        backup_dir: PathBuf,
    },
    /// The install failed and the previous tree was restored.
    RolledBack {
        version: String,
        error: String,
        app_dir: PathBuf,
    },
    /// The install failed and the previous tree could not be restored.
    RollbackFailed {
        version: String,
        error: String,
        rollback_error: String,
        app_dir: PathBuf,
        backup_dir: PathBuf,
    },
    /// The application directory has no entry point while `backup_dir`
    /// exists: an earlier apply was interrupted. Nothing was changed.
    RecoveryNeeded { app_dir: PathBuf, backup_dir: PathBuf },
}

impl InstallOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Message for the user, worded for the severity of the outcome.
    pub fn user_message(&self) -> String {
        match self {
            Self::NothingToApply => "No update is pending.".to_owned(),
            Self::Committed {
                version,
                backup_dir,
                ..
            } => format!(
                "AirDocs was updated to version {version}. The previous version is kept in {}.",
                backup_dir.display()
            ),
            Self::RolledBack { version, error, .. } => format!(
                "The update to version {version} could not be installed and was rolled back. \
                 AirDocs is unchanged.\n\nError: {error}"
            ),
            Self::RollbackFailed {
                version,
                error,
                rollback_error,
                app_dir,
                backup_dir,
            } => format!(
                "The update to version {version} failed and the previous version could not be \
                 restored automatically.\n\nError: {error}\nRollback error: {rollback_error}\n\n\
                 Application directory: {}\nBackup directory: {}\n\n\
                 To recover, delete the application directory and rename the backup directory \
                 to the application directory's name.",
                app_dir.display(),
                backup_dir.display()
            ),
            Self::RecoveryNeeded {
                app_dir,
                backup_dir,
            } => format!(
                "AirDocs is incomplete: an earlier update was interrupted. The previous version \
                 is intact and has NOT been touched.\n\n\
                 Application directory (incomplete): {}\nBackup directory (complete): {}\n\n\
                 To recover, delete the application directory and rename the backup directory \
                 to the application directory's name.",
                app_dir.display(),
                backup_dir.display()
            ),
        }
    }
}

/// Runs the apply state machine for one installation.
pub struct InstallApplier<'a> {
    ctx: &'a UpdateContext,
    sink: &'a dyn ProgressSink,
    state: ApplyState,
}

impl<'a> InstallApplier<'a> {
    pub fn new(ctx: &'a UpdateContext, sink: &'a dyn ProgressSink) -> Self {
        Self {
            ctx,
            sink,
            state: ApplyState::Idle,
        }
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    fn transition(&mut self, next: ApplyState) {
        debug!(from = ?self.state, to = ?next, "apply state");
        self.state = next;
    }

    /// Apply the staged update, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only when the install was not touched: a malformed
    /// marker, a missing extracted tree or application directory, or a
    /// stale backup that cannot be archived. Failures after that point are
    /// reported as [`InstallOutcome::RolledBack`] or
    /// [`InstallOutcome::RollbackFailed`]. An interrupted earlier apply is
    /// reported as [`InstallOutcome::RecoveryNeeded`] before anything else
    /// is looked at.
    pub fn apply(&mut self) -> Result<InstallOutcome> {
        let ctx = self.ctx;
        let layout = &ctx.layout;
        let pending = ctx.pending();

        if let Some(outcome) = recovery_needed(layout, &ctx.config.install.entry_point) {
            return Ok(self.finish(outcome));
        }

        let Some(marker) = pending.read()? else {
            debug!("no pending update");
            return Ok(InstallOutcome::NothingToApply);
        };
        self.transition(ApplyState::MarkerFound);

        let app_dir = layout.app_dir().to_path_buf();
        let backup_dir = layout.backup_dir();
        let extracted = marker.resolved_extracted_path(layout.user_dir());
        info!(
            version = %marker.version,
            app_dir = %app_dir.display(),
            extracted = %extracted.display(),
            "applying pending update"
        );

        if !extracted.is_dir() {
            error!(path = %extracted.display(), "extracted update not found");
            return Err(UpdateError::Install(format!(
                "extracted update not found: {}",
                extracted.display()
            )));
        }
        if !app_dir.is_dir() {
            return Err(UpdateError::Install(format!(
                "application directory not found: {}",
                app_dir.display()
            )));
        }
        archive_stale_backup(&backup_dir).map_err(|e| {
            UpdateError::Install(format!(
                "cannot archive existing backup {}: {e}",
                backup_dir.display()
            ))
        })?;

        self.transition(ApplyState::BackingUp);
        self.sink.on_progress(Stage::BackingUp, 0, 1);
        if let Err(error) = self.settle_backup(rename_or_copy(&app_dir, &backup_dir)) {
            self.transition(ApplyState::RolledBack);
            self.record(&UpdateHistoryRecord::failure(
                &marker,
                &self.ctx.current_version,
                &error,
                false,
            ));
            if let Some(outcome) = recovery_needed(layout, &ctx.config.install.entry_point) {
                return Ok(self.finish(outcome));
            }
            return Ok(self.finish(InstallOutcome::RolledBack {
                version: marker.version,
                error,
                app_dir,
            }));
        }
        self.sink.on_progress(Stage::BackingUp, 1, 1);
        info!(backup = %backup_dir.display(), "current installation backed up");

        let staged = layout.rebase_into_backup(&extracted);
        match self.install(layout, &staged) {
            Ok(()) => Ok(self.commit(&marker, &staged, &pending)),
            Err(e) => Ok(self.roll_back(&marker, &e)),
        }
    }

    /// Turn the result of moving `<App>` to `<App>_old` into either a
    /// complete backup (`Ok`) or an error message. A backup is only deleted
    /// while `<App>` is still complete.
    fn settle_backup(&self, moved: io::Result<Moved>) -> std::result::Result<(), String> {
        let layout = &self.ctx.layout;
        let app_dir = layout.app_dir();
        let backup_dir = layout.backup_dir();
        match moved {
            Ok(Moved::SourceKept(e)) => {
                warn!(
                    app_dir = %app_dir.display(),
                    error = %e,
                    "backup is complete but the old tree was not fully removed, clearing the rest"
                );
                remove_tree_best_effort(app_dir);
                Ok(())
            }
            Ok(Moved::Renamed | Moved::Copied) => Ok(()),
            Err(e) => {
                let error = format!("cannot back up {}: {e}", app_dir.display());
                if is_complete(layout, &self.ctx.config.install.entry_point) {
                    error!(error = %error, "backup failed, installation untouched");
                    remove_tree_best_effort(&backup_dir);
                } else {
                    error!(
                        error = %error,
                        backup = %backup_dir.display(),
                        "backup failed and the application directory is incomplete, keeping the backup"
                    );
                }
                Err(error)
            }
        }
    }

    /// Copy, restore, verify. Everything here is undone by a rollback.
    fn install(&mut self, layout: &InstallLayout, staged: &Path) -> Result<()> {
        if !staged.is_dir() {
            return Err(UpdateError::Install(format!(
                "extracted update missing after backup: {}",
                staged.display()
            )));
        }

        self.transition(ApplyState::Copying);
        let total = count_files(staged);
        let sink = self.sink;
        let copied = copy_tree_with_progress(staged, layout.app_dir(), |n| {
            sink.on_progress(Stage::Copying, n, total);
        })
        .map_err(|e| UpdateError::Install(format!("copying new version: {e}")))?;
        info!(files = copied, "new version copied");

        self.transition(ApplyState::RestoringUserData);
        self.sink.on_progress(Stage::RestoringUserData, 0, 1);
        restore_user_data(layout, &self.ctx.config.install, &[staged.to_path_buf()])?;
        self.sink.on_progress(Stage::RestoringUserData, 1, 1);

        self.transition(ApplyState::Verifying);
        self.sink.on_progress(Stage::VerifyingInstall, 0, 1);
        let entry_point = layout.app_dir().join(&self.ctx.config.install.entry_point);
        if !entry_point.is_file() {
            return Err(UpdateError::Install(format!(
                "entry point missing after install: {}",
                entry_point.display()
            )));
        }
        self.sink.on_progress(Stage::VerifyingInstall, 1, 1);
        Ok(())
    }

    fn commit(
        &mut self,
        marker: &PendingUpdateMarker,
        staged: &Path,
        pending: &PendingUpdateState,
    ) -> InstallOutcome {
        let ctx = self.ctx;
        let layout = &ctx.layout;
        self.transition(ApplyState::Committed);

        remove_tree_best_effort(staged);
        for marker_path in [
            pending.path().to_path_buf(),
            layout.rebase_into_backup(pending.path()),
        ] {
            if let Err(e) = PendingUpdateState::new(&marker_path).clear() {
                error!(error = %e, "failed to clear pending update marker");
            }
        }

        self.record(&UpdateHistoryRecord::success(
            marker,
            &self.ctx.current_version,
        ));
        info!(version = %marker.version, "update committed");

        self.finish(InstallOutcome::Committed {
            version: marker.version.clone(),
            app_dir: layout.app_dir().to_path_buf(),
            backup_dir: layout.backup_dir(),
        })
    }

    fn roll_back(&mut self, marker: &PendingUpdateMarker, cause: &UpdateError) -> InstallOutcome {
        let ctx = self.ctx;
        let layout = &ctx.layout;
        let error = cause.to_string();
        error!(error = %error, state = ?self.state, "install failed, rolling back");

        self.transition(ApplyState::RollingBack);
        self.sink.on_progress(Stage::RollingBack, 0, 1);

        match rollback(layout) {
            Ok(()) => {
                self.transition(ApplyState::RolledBack);
                self.sink.on_progress(Stage::RollingBack, 1, 1);
                warn!(version = %marker.version, "update rolled back");
                self.record(&UpdateHistoryRecord::failure(
                    marker,
                    &self.ctx.current_version,
                    &error,
                    true,
                ));
                self.finish(InstallOutcome::RolledBack {
                    version: marker.version.clone(),
                    error,
                    app_dir: layout.app_dir().to_path_buf(),
                })
            }
            Err(rollback_error) => {
                self.transition(ApplyState::RollbackFailed);
                error!(error = %rollback_error, "rollback failed, manual recovery required");
                self.record(&UpdateHistoryRecord::failure(
                    marker,
                    &self.ctx.current_version,
                    &error,
                    false,
                ));
                self.finish(InstallOutcome::RollbackFailed {
                    version: marker.version.clone(),
                    error,
                    rollback_error: rollback_error.to_string(),
                    app_dir: layout.app_dir().to_path_buf(),
                    backup_dir: layout.backup_dir(),
                })
            }
        }
    }

    fn record(&self, record: &UpdateHistoryRecord) {
        if let Err(e) = self.ctx.history().append(record) {
            warn!(error = %e, "could not record update history");
        }
    }

    fn finish(&self, outcome: InstallOutcome) -> InstallOutcome {
        self.sink.on_outcome(&outcome);
        outcome
    }
}

/// Restore `<App>_old` to `<App>`, discarding whatever is at `<App>`.
///
/// # Errors
///
/// Returns [`UpdateError::RollbackFailed`] naming both directories.
pub fn rollback(layout: &InstallLayout) -> Result<()> {
    let app_dir = layout.app_dir();
    let backup_dir = layout.backup_dir();
    let failed = |reason: String| UpdateError::RollbackFailed {
        reason,
        app_dir: app_dir.to_path_buf(),
        backup_dir: backup_dir.clone(),
    };

    if !backup_dir.is_dir() {
        return Err(failed("backup directory is missing".to_owned()));
    }
    if app_dir.exists()
        && let Err(e) = std::fs::remove_dir_all(app_dir)
    {
        warn!(path = %app_dir.display(), error = %e, "could not fully remove failed install");
    }
    let moved = rename_or_copy(&backup_dir, app_dir)
        .map_err(|e| failed(format!("cannot restore backup: {e}")))?;
    if let Moved::SourceKept(e) = moved {
        warn!(
            backup = %backup_dir.display(),
            error = %e,
            "backup restored but not fully removed"
        );
    }
    info!(app_dir = %app_dir.display(), "previous installation restored");
    Ok(())
}

/// `true` if the entry point exists under `<App>`.
fn is_complete(layout: &InstallLayout, entry_point: &str) -> bool {
    layout.app_dir().join(entry_point).is_file()
}

/// [`InstallOutcome::RecoveryNeeded`] when `<App>_old` exists next to an
/// `<App>` without its entry point.
fn recovery_needed(layout: &InstallLayout, entry_point: &str) -> Option<InstallOutcome> {
    let backup_dir = layout.backup_dir();
    if !backup_dir.is_dir() || is_complete(layout, entry_point) {
        return None;
    }
    error!(
        app_dir = %layout.app_dir().display(),
        backup = %backup_dir.display(),
        entry_point,
        "application directory is incomplete, previous version kept for manual recovery"
    );
    Some(InstallOutcome::RecoveryNeeded {
        app_dir: layout.app_dir().to_path_buf(),
        backup_dir,
    })
}

/// Remove `<App>_old` left by an earlier successful update. Returns `true`
/// if a directory was removed. Archived `<App>_old-<timestamp>` copies are
/// kept, and nothing is removed unless `<App>/<entry_point>` exists.
pub fn cleanup_old_version(layout: &InstallLayout, entry_point: &str) -> bool {
    let backup = layout.backup_dir();
    if !backup.is_dir() {
        return false;
    }
    if !is_complete(layout, entry_point) {
        warn!(
            path = %backup.display(),
            entry_point,
            "application directory has no entry point, keeping the previous version"
        );
        return false;
    }
    match std::fs::remove_dir_all(&backup) {
        Ok(()) => {
            info!(path = %backup.display(), "removed previous version");
            true
        }
        Err(e) => {
            warn!(path = %backup.display(), error = %e, "could not remove previous version");
            false
        }
    }
}
