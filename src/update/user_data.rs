//! Carrying user data from the backed-up install into the new one.
//!
//! Only portable installs need this: when the user-data directory lives
//! outside the application directory the new tree never touches it.
//!
//! Rules, applied in order:
//! - singleton files (the database, `config_override.yaml`) always replace
//!   whatever the package shipped;
//! - top-level dotfiles are copied only when absent, and never the
//!   pending-update marker;
//! - bulk directories are overlaid: a previous file replaces a packaged
//!   file at the same path, packaged files without a previous counterpart
//!   stay, so neither side loses a file the other lacks.

use crate::app_dirs::{InstallLayout, PENDING_MARKER_NAME};
use crate::config::InstallConfig;
use crate::error::{Result, UpdateError};
use crate::update::fs_ops::overlay_dir;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Counts of what a restore copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub singletons: usize,
    pub dotfiles: usize,
    pub merged_files: u64,
}

/// Restore user data from `layout.backup_dir()` into `layout.app_dir()`.
///
/// `exclude` lists paths inside the backup that must not be merged (the
/// staged extracted tree).
///
/// # Errors
///
/// Returns [`UpdateError::Install`] on the first copy failure.
pub fn restore_user_data(
    layout: &InstallLayout,
    config: &InstallConfig,
    exclude: &[PathBuf],
) -> Result<RestoreSummary> {
    let Some(rel) = layout.user_dir_relative() else {
        debug!(
            user_dir = %layout.user_dir().display(),
            "user data outside the application directory, nothing to restore"
        );
        return Ok(RestoreSummary::default());
    };

    let old_user = layout.backup_dir().join(rel);
    let new_user = layout.app_dir().join(rel);
    if !old_user.is_dir() {
        debug!(path = %old_user.display(), "no previous user data");
        return Ok(RestoreSummary::default());
    }
    std::fs::create_dir_all(&new_user).map_err(|e| install_err(&new_user, &e))?;

    let mut summary = RestoreSummary::default();

    for name in &config.singleton_files {
        let src = old_user.join(name);
        if src.is_file() {
            let dst = new_user.join(name);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent).map_err(|e| install_err(parent, &e))?;
            }
            std::fs::copy(&src, &dst).map_err(|e| install_err(&src, &e))?;
            summary.singletons += 1;
            debug!(file = %name, "restored singleton");
        }
    }

    let entries = std::fs::read_dir(&old_user).map_err(|e| install_err(&old_user, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| install_err(&old_user, &e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') || name.starts_with(PENDING_MARKER_NAME) {
            continue;
        }
        let src = entry.path();
        let dst = new_user.join(&*name);
        if src.is_file() && !dst.exists() {
            std::fs::copy(&src, &dst).map_err(|e| install_err(&src, &e))?;
            summary.dotfiles += 1;
        }
    }

    for dir in &config.merge_dirs {
        let src = old_user.join(dir);
        if src.is_dir() {
            let copied = overlay_dir(&src, &new_user.join(dir), exclude)
                .map_err(|e| install_err(&src, &e))?;
            summary.merged_files += copied;
        }
    }

    info!(
        singletons = summary.singletons,
        dotfiles = summary.dotfiles,
        merged_files = summary.merged_files,
        "user data restored"
    );
    Ok(summary)
}

fn install_err(path: &Path, e: &std::io::Error) -> UpdateError {
    UpdateError::Install(format!("restoring {}: {e}", path.display()))
}
