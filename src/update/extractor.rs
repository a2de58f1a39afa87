//! Zip package extraction.

use crate::error::{Result, UpdateError};
use crate::progress::{ProgressSink, Stage};
use std::fs::File;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;
use zip::ZipArchive;

/// What an extraction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Archive entries processed (files and directories).
    pub entries: usize,
    /// Regular files written.
    pub files: usize,
}

/// Unpack `archive_path` into `target`, reporting `(index, total)` per
/// entry.
///
/// Any failing member aborts the whole extraction, including a member
/// whose path would land outside `target`. Whatever was already written is
/// left on disk for diagnosis.
///
/// # Errors
///
/// Returns [`UpdateError::Extraction`] for archive or member failures and
/// [`UpdateError::Cancelled`] if `cancel` fires between entries.
pub fn extract_with_progress(
    archive_path: &Path,
    target: &Path,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<ExtractionSummary> {
    let file = File::open(archive_path).map_err(|e| {
        UpdateError::Extraction(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| UpdateError::Extraction(format!("invalid archive: {e}")))?;

    std::fs::create_dir_all(target).map_err(|e| {
        UpdateError::Extraction(format!("cannot create {}: {e}", target.display()))
    })?;

    let total = archive.len();
    let mut files = 0;
    info!(
        archive = %archive_path.display(),
        target = %target.display(),
        entries = total,
        "extracting update package"
    );

    for i in 0..total {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdateError::Extraction(format!("cannot read entry {i}: {e}")))?;
        let name = entry.name().to_owned();
        let Some(rel) = entry.enclosed_name() else {
            return Err(UpdateError::Extraction(format!(
                "entry escapes the target directory: {name}"
            )));
        };
        let outpath = target.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| UpdateError::Extraction(format!("{name}: {e}")))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| UpdateError::Extraction(format!("{name}: {e}")))?;
            }
            let mut out = File::create(&outpath)
                .map_err(|e| UpdateError::Extraction(format!("{name}: {e}")))?;
            std::io::copy(&mut entry, &mut out)
                .map_err(|e| UpdateError::Extraction(format!("{name}: {e}")))?;
            files += 1;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode & 0o777))
                    .map_err(|e| UpdateError::Extraction(format!("{name}: {e}")))?;
            }
        }

        sink.on_progress(Stage::Extracting, (i + 1) as u64, total as u64);
    }

    info!(target = %target.display(), entries = total, files, "extraction complete");
    Ok(ExtractionSummary {
        entries: total,
        files,
    })
}
