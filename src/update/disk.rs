//! Free-space checks for the download and extraction directory.

use crate::error::{Result, UpdateError};
use std::path::Path;

/// Returns the available disk space in bytes at the given path.
///
/// # Errors
///
/// Returns an error if the filesystem stats cannot be retrieved.
#[cfg(unix)]
pub fn available_disk_space(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| UpdateError::Config(format!("invalid path for statvfs: {e}")))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };

    if ret != 0 {
        return Err(UpdateError::Io(std::io::Error::last_os_error()));
    }

    // f_bavail: blocks available to unprivileged users.
    let bavail: u64 = stat.f_bavail as _;
    let frsize: u64 = stat.f_frsize as _;
    Ok(bavail.wrapping_mul(frsize))
}

/// Fallback for non-Unix platforms: returns `u64::MAX` (skip the check).
#[cfg(not(unix))]
pub fn available_disk_space(_path: &Path) -> Result<u64> {
    Ok(u64::MAX)
}

/// Bytes required to stage a package of `package_size` bytes.
pub fn required_space(package_size: u64, factor: f64) -> u64 {
    (package_size as f64 * factor).ceil() as u64
}

/// Fail unless `dir` has room for a package of `package_size` bytes plus
/// its extracted tree. A size of zero means unknown and skips the check.
///
/// # Errors
///
/// Returns [`UpdateError::InsufficientSpace`] when free space is short, or
/// an I/O error if the filesystem cannot be queried.
pub fn ensure_disk_space(dir: &Path, package_size: u64, factor: f64) -> Result<()> {
    if package_size == 0 {
        tracing::debug!(dir = %dir.display(), "package size unknown, skipping disk space check");
        return Ok(());
    }
    let required = required_space(package_size, factor);
    let available = available_disk_space(dir)?;
    if available < required {
        tracing::error!(
            dir = %dir.display(),
            required,
            available,
            "insufficient disk space for update"
        );
        return Err(UpdateError::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}
