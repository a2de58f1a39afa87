//! Download, verify, extract, and stage an update for the next start.

use crate::context::UpdateContext;
use crate::error::{Result, UpdateError};
use crate::progress::ProgressSink;
use crate::update::checker::UpdateInfo;
use crate::update::disk::ensure_disk_space;
use crate::update::downloader::Downloader;
use crate::update::extractor::{ExtractionSummary, extract_with_progress};
use crate::update::fs_ops::remove_tree_best_effort;
use crate::update::pending::PendingUpdateMarker;
use crate::update::verifier::{Verification, verify_package};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A staged update, ready to be applied on the next start.
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub marker: PendingUpdateMarker,
    pub package: PathBuf,
    /// `true` when a previously downloaded package was reused.
    pub reused_package: bool,
    pub verification: Verification,
    pub extraction: ExtractionSummary,
}

/// Stage `info` using the context's downloader.
///
/// # Errors
///
/// See [`prepare_update_with`].
pub fn prepare_update(
    ctx: &UpdateContext,
    info: &UpdateInfo,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<PreparedUpdate> {
    let downloader = ctx.downloader().with_cancellation(cancel.clone());
    prepare_update_with(ctx, &downloader, info, sink, cancel)
}

/// Stage `info` with an explicit downloader.
///
/// A package already on disk is reused when its size matches the advertised
/// size (or the size is unknown). A package that fails verification is
/// deleted so the next attempt downloads it again.
///
/// # Errors
///
/// Returns the first failing step's error. The marker is only written
/// after every step succeeded.
pub fn prepare_update_with(
    ctx: &UpdateContext,
    downloader: &Downloader,
    info: &UpdateInfo,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<PreparedUpdate> {
    let layout = &ctx.layout;
    let updates_dir = layout.updates_dir();
    std::fs::create_dir_all(&updates_dir)?;

    ensure_disk_space(
        &updates_dir,
        info.size_bytes,
        ctx.config.download.disk_space_factor,
    )?;

    let package = layout.package_path(&info.version, &ctx.config.install.package_extension);
    let mut reused_package = false;
    if package.is_file() {
        let on_disk = std::fs::metadata(&package)?.len();
        if info.size_bytes > 0 && on_disk != info.size_bytes {
            info!(
                path = %package.display(),
                on_disk,
                expected = info.size_bytes,
                "existing package has the wrong size, downloading again"
            );
            std::fs::remove_file(&package)?;
        } else {
            info!(path = %package.display(), "using existing update package");
            reused_package = true;
        }
    }

    let mut download_duration_secs = 0.0;
    if !reused_package {
        let started = Instant::now();
        downloader.download(&info.url, &package, sink)?;
        download_duration_secs = started.elapsed().as_secs_f64();
    }

    let verification = match verify_package(&package, info.sha256.as_deref(), sink) {
        Ok(v) => v,
        Err(e @ UpdateError::Verification { .. }) => {
            warn!(path = %package.display(), "deleting package that failed verification");
            remove_tree_best_effort(&package);
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let extracted = layout.extracted_dir(&info.version);
    if extracted.exists() {
        remove_tree_best_effort(&extracted);
    }
    let extraction = extract_with_progress(&package, &extracted, sink, cancel)?;

    let marker = PendingUpdateMarker::from_update(info, extracted, download_duration_secs);
    ctx.pending().write(&marker)?;
    info!(version = %info.version, ?verification, "update staged for next start");

    Ok(PreparedUpdate {
        marker,
        package,
        reused_package,
        verification,
        extraction,
    })
}
