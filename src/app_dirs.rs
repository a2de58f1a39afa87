//! Installation directory layout.
//!
//! Every path the updater touches is derived from two roots: the live
//! application directory (`App`) and the user-data directory. A portable
//! install keeps user data inside the application directory
//! (`App/data`); only then does an update need to carry user data across.
//!
//! # Layout
//!
//! | Path | Purpose |
//! |------|---------|
//! | `<parent>/App` | live installation |
//! | `<parent>/App_old` | backup taken during an apply |
//! | `<user_dir>/.pending_update` | staged-update marker |
//! | `<user_dir>/updates/` | downloaded packages and extracted trees |
//! | `<user_dir>/logs/updater.log` | updater log |
//!
//! # Environment Overrides
//!
//! - `AIRDOCS_APP_DIR`: overrides the application directory
//! - `AIRDOCS_USER_DIR`: overrides the user-data directory

use crate::config::InstallConfig;
use crate::error::{Result, UpdateError};
use std::path::{Path, PathBuf};

/// Filename of the staged-update marker.
pub const PENDING_MARKER_NAME: &str = ".pending_update";

/// Filename of the persisted check state.
pub const CHECK_STATE_NAME: &str = "update-state.json";

/// Resolved directory layout for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    app_dir: PathBuf,
    user_dir: PathBuf,
}

impl InstallLayout {
    /// Build a layout from explicit roots.
    pub fn new(app_dir: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            user_dir: user_dir.into(),
        }
    }

    /// Portable layout: user data lives in `<app_dir>/data`.
    pub fn portable(app_dir: impl Into<PathBuf>) -> Self {
        let app_dir = app_dir.into();
        let user_dir = app_dir.join("data");
        Self { app_dir, user_dir }
    }

    /// Resolve the layout from config, environment, and the running
    /// executable's location.
    ///
    /// # Errors
    ///
    /// Returns an error if no application directory can be determined.
    pub fn resolve(config: &InstallConfig) -> Result<Self> {
        let app_dir = match std::env::var_os("AIRDOCS_APP_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => match &config.app_dir {
                Some(dir) => dir.clone(),
                None => current_exe_dir()?,
            },
        };

        let user_dir = match std::env::var_os("AIRDOCS_USER_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => match &config.user_dir {
                Some(dir) => dir.clone(),
                None if config.portable => app_dir.join("data"),
                None => platform_user_dir(),
            },
        };

        Ok(Self { app_dir, user_dir })
    }

    /// Live application directory.
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// User-data directory.
    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Backup directory used during an apply: a sibling named
    /// `<app dir name>_old`.
    pub fn backup_dir(&self) -> PathBuf {
        let name = self
            .app_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_owned());
        self.app_parent().join(format!("{name}_old"))
    }

    /// Parent directory holding both `App` and `App_old`.
    pub fn app_parent(&self) -> PathBuf {
        self.app_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// `true` when user data is stored inside the application directory.
    pub fn is_portable(&self) -> bool {
        self.user_dir.starts_with(&self.app_dir)
    }

    /// User-data path relative to the application directory, for portable
    /// installs.
    pub fn user_dir_relative(&self) -> Option<&Path> {
        self.user_dir.strip_prefix(&self.app_dir).ok()
    }

    /// Staged-update marker path.
    pub fn pending_marker(&self) -> PathBuf {
        self.user_dir.join(PENDING_MARKER_NAME)
    }

    /// Download and extraction directory.
    pub fn updates_dir(&self) -> PathBuf {
        self.user_dir.join("updates")
    }

    /// Log directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.user_dir.join("logs")
    }

    /// Persisted check-state file.
    pub fn check_state_file(&self) -> PathBuf {
        self.user_dir.join(CHECK_STATE_NAME)
    }

    /// User database (also holds the update history table).
    pub fn database(&self, config: &InstallConfig) -> PathBuf {
        self.user_dir.join(&config.database_file)
    }

    /// Package path for a given version.
    pub fn package_path(&self, version: &str, extension: &str) -> PathBuf {
        self.updates_dir().join(format!("update_{version}{extension}"))
    }

    /// Extraction target for a given version.
    pub fn extracted_dir(&self, version: &str) -> PathBuf {
        self.updates_dir().join(format!("extracted_v{version}"))
    }

    /// Map a path inside the live application directory to the same
    /// location under the backup directory. Paths outside the application
    /// directory are returned unchanged.
    pub fn rebase_into_backup(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.app_dir) {
            Ok(rel) => self.backup_dir().join(rel),
            Err(_) => path.to_path_buf(),
        }
    }
}

/// Default user-data directory for non-portable installs.
pub fn platform_user_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("airdocs"))
        .unwrap_or_else(|| PathBuf::from("/tmp/airdocs-data"))
}

fn current_exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| {
        UpdateError::Config(format!("cannot determine current executable path: {e}"))
    })?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        UpdateError::Config(format!("executable has no parent directory: {}", exe.display()))
    })
}
