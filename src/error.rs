//! Error types for the update engine.

use std::path::PathBuf;

/// Top-level error type for checking, staging, and applying updates.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Connectivity, timeout, or HTTP status failure while talking to the
    /// update server. Callers on the check path degrade this to "no update".
    #[error("network error: {0}")]
    Network(String),

    /// Package download failed after exhausting all attempts.
    #[error("download failed after {attempts} attempts: {last_error}")]
    Download {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last_error: String,
    },

    /// Package digest did not match the advertised checksum.
    #[error("package verification failed: expected {expected}, got {actual}")]
    Verification {
        /// Digest advertised by the manifest.
        expected: String,
        /// Digest computed from the downloaded file.
        actual: String,
    },

    /// Archive could not be unpacked.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A step of the install sequence failed (rollback is attempted).
    #[error("install error: {0}")]
    Install(String),

    /// The install failed and restoring the previous tree failed too.
    #[error(
        "rollback failed: {reason}. Application directory: {}, backup directory: {}",
        app_dir.display(),
        backup_dir.display()
    )]
    RollbackFailed {
        /// Why the rollback could not complete.
        reason: String,
        /// Live application directory.
        app_dir: PathBuf,
        /// Backup directory holding the previous installation.
        backup_dir: PathBuf,
    },

    /// Pending-update marker missing fields, unreadable, or unwritable.
    #[error("pending update marker error: {0}")]
    Marker(String),

    /// Update history could not be recorded or read.
    #[error("update history error: {0}")]
    History(String),

    /// Not enough free disk space for the download and extraction.
    #[error("not enough disk space: need {required} bytes, {available} available")]
    InsufficientSpace {
        /// Bytes required (1.5x the package size).
        required: u64,
        /// Bytes free on the target filesystem.
        available: u64,
    },

    /// The operation was cancelled by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;
