//! Filesystem primitives used by the install sequence.

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively copy `src` into `dst`, creating `dst`. Returns the number
/// of files copied.
///
/// Symbolic links are followed: a link to a directory is copied as a
/// directory, a link to a file as that file's contents.
///
/// # Errors
///
/// Fails on the first entry that cannot be read or written, including a
/// dangling link or a link cycle.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    copy_tree_with_progress(src, dst, |_| {})
}

/// [`copy_tree`], calling `on_file` with the running file count after each
/// file.
///
/// # Errors
///
/// Fails on the first entry that cannot be read or written.
pub fn copy_tree_with_progress(
    src: &Path,
    dst: &Path,
    mut on_file: impl FnMut(u64),
) -> io::Result<u64> {
    std::fs::create_dir_all(dst)?;
    let mut files = 0;
    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| {
                io::Error::new(e.kind(), format!("{}: {e}", entry.path().display()))
            })?;
            files += 1;
            on_file(files);
        }
    }
    Ok(files)
}

/// Number of non-directory entries below `root`.
pub fn count_files(root: &Path) -> u64 {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .count() as u64
}

/// Copy every file of `src` into `dst`, replacing a file of the same
/// relative path. Files only present in `dst` are left alone. Anything at
/// or below a path in `exclude` is skipped. Returns the number of files
/// copied.
///
/// # Errors
///
/// Fails on the first entry that cannot be read or written.
pub fn overlay_dir(src: &Path, dst: &Path, exclude: &[PathBuf]) -> io::Result<u64> {
    let mut copied = 0;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path().starts_with(x)));
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if target.is_dir() {
                std::fs::remove_dir_all(&target)?;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// `true` if the error is a rename across filesystems (`EXDEV`,
/// `ERROR_NOT_SAME_DEVICE`).
pub fn is_cross_device(e: &io::Error) -> bool {
    #[cfg(unix)]
    const CROSS_DEVICE: i32 = libc::EXDEV;
    #[cfg(windows)]
    const CROSS_DEVICE: i32 = 17;
    #[cfg(not(any(unix, windows)))]
    const CROSS_DEVICE: i32 = -1;

    e.raw_os_error() == Some(CROSS_DEVICE)
}

/// How [`rename_or_copy`] moved a path.
#[derive(Debug)]
pub enum Moved {
    Renamed,
    /// Copied across filesystems and the source removed.
    Copied,
    /// Copied across filesystems, but removing the source failed. The
    /// destination is complete; the source may be partially deleted.
    SourceKept(io::Error),
}

/// Rename `from` to `to`, falling back to copy + delete when the two paths
/// are on different filesystems.
///
/// # Errors
///
/// Returns the rename error, or the copy error of the fallback. A failed
/// copy leaves `from` untouched. A failed removal after a complete copy is
/// not an error but [`Moved::SourceKept`].
pub fn rename_or_copy(from: &Path, to: &Path) -> io::Result<Moved> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(Moved::Renamed),
        Err(e) if is_cross_device(&e) => {
            warn!(
                from = %from.display(),
                to = %to.display(),
                "rename crosses filesystems, falling back to copy and delete; the move is no longer atomic"
            );
            copy_then_remove(from, to)
        }
        Err(e) => Err(e),
    }
}

fn copy_then_remove(from: &Path, to: &Path) -> io::Result<Moved> {
    copy_then_remove_with(from, to, |path| {
        if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        }
    })
}

fn copy_then_remove_with(
    from: &Path,
    to: &Path,
    remove: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<Moved> {
    if from.is_dir() {
        if let Err(e) = copy_tree(from, to) {
            remove_tree_best_effort(to);
            return Err(e);
        }
    } else {
        std::fs::copy(from, to)?;
    }
    match remove(from) {
        Ok(()) => Ok(Moved::Copied),
        Err(e) => {
            warn!(
                from = %from.display(),
                to = %to.display(),
                error = %e,
                "copy complete but the source could not be removed"
            );
            Ok(Moved::SourceKept(e))
        }
    }
}

/// Delete a file or directory tree, logging instead of failing.
pub fn remove_tree_best_effort(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        return;
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to remove");
    }
}

/// Move an existing backup directory out of the way, renaming it to
/// `<name>-<UTC timestamp>`. Returns the archive path, or `None` if there
/// was nothing to archive.
///
/// # Errors
///
/// Returns an error if the rename fails.
pub fn archive_stale_backup(backup: &Path) -> io::Result<Option<PathBuf>> {
    if !backup.exists() {
        return Ok(None);
    }
    let name = backup
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_owned());
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let parent = backup.parent().unwrap_or_else(|| Path::new("."));

    let mut archive = parent.join(format!("{name}-{stamp}"));
    let mut n = 1;
    while archive.exists() {
        archive = parent.join(format!("{name}-{stamp}-{n}"));
        n += 1;
    }

    if let Moved::SourceKept(e) = rename_or_copy(backup, &archive)? {
        return Err(e);
    }
    warn!(
        backup = %backup.display(),
        archive = %archive.display(),
        "previous backup directory still present, archived it"
    );
    Ok(Some(archive))
}
