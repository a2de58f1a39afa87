//! Package integrity verification.

use crate::error::{Result, UpdateError};
use crate::progress::{ProgressSink, Stage};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of a successful verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Digest matched the expected value.
    Verified,
    /// No checksum was available; integrity was not checked.
    Skipped,
}

/// Compute the SHA-256 hex digest of a file, reading in 64 KiB chunks.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    sha256_with_progress(path, None)
}

fn sha256_with_progress(path: &Path, sink: Option<&dyn ProgressSink>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let total = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut hashed: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        hashed += n as u64;
        if let Some(sink) = sink {
            sink.on_progress(Stage::Verifying, hashed, total);
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a package against an optional expected digest.
///
/// Comparison is case-insensitive. `None` (or an empty string) skips the
/// check with a warning and reports [`Verification::Skipped`].
///
/// # Errors
///
/// Returns [`UpdateError::Verification`] on mismatch, or an I/O error if the
/// file cannot be read.
pub fn verify_package(
    path: &Path,
    expected_sha256: Option<&str>,
    sink: &dyn ProgressSink,
) -> Result<Verification> {
    let expected = match expected_sha256.map(str::trim) {
        Some(h) if !h.is_empty() => h,
        _ => {
            warn!(
                path = %path.display(),
                "no checksum available, skipping package verification"
            );
            return Ok(Verification::Skipped);
        }
    };

    let actual = sha256_with_progress(path, Some(sink))?;
    if actual.eq_ignore_ascii_case(expected) {
        info!(path = %path.display(), "package checksum verified");
        Ok(Verification::Verified)
    } else {
        warn!(
            path = %path.display(),
            expected,
            actual = %actual,
            "package checksum mismatch"
        );
        Err(UpdateError::Verification {
            expected: expected.to_owned(),
            actual,
        })
    }
}
