//! Configuration types for the update engine.

use crate::app_dirs::CHECK_STATE_NAME;
use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound applied to network request timeouts.
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound applied to network request timeouts.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration for the updater.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Where and how often to look for updates.
    pub check: CheckConfig,
    /// Package download settings.
    pub download: DownloadConfig,
    /// Installation layout and user-data restore rules.
    pub install: InstallConfig,
}

/// Release channel tracked by an installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Newest published build (default).
    #[default]
    Latest,
    /// Slower, vetted track.
    Stable,
}

impl Channel {
    /// Key used for this channel in the manifest document.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// URL of the channel manifest JSON. Preferred source when set.
    pub manifest_url: Option<String>,
    /// Release-feed repository in `OWNER/REPO` form, used as fallback.
    pub github_repo: Option<String>,
    /// Base URL of the release-feed API.
    pub release_api_base: String,
    /// Channel to track.
    pub channel: Channel,
    /// Whether to check for updates when the application starts.
    pub check_on_startup: bool,
    /// Minimum hours between automatic checks.
    pub check_interval_hours: u64,
    /// Request timeout in seconds (clamped to 10..=30).
    pub request_timeout_secs: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            manifest_url: None,
            github_repo: None,
            release_api_base: "https://api.github.com".to_owned(),
            channel: Channel::Latest,
            check_on_startup: true,
            check_interval_hours: 24,
            request_timeout_secs: 30,
        }
    }
}

impl CheckConfig {
    /// Effective request timeout, clamped to the supported range.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS),
        )
    }
}

/// Package download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Total download attempts before giving up.
    pub max_attempts: u32,
    /// Delay before each retry, in milliseconds. The last entry repeats if
    /// there are more retries than entries.
    pub backoff_ms: Vec<u64>,
    /// Required free space as a multiple of the package size.
    pub disk_space_factor: f64,
    /// Streaming read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: vec![1_000, 2_000, 4_000],
            disk_space_factor: 1.5,
            read_timeout_secs: 30,
        }
    }
}

impl DownloadConfig {
    /// Delay to wait after the given (zero-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = attempt as usize;
        let ms = self
            .backoff_ms
            .get(idx)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Installation layout and user-data restore rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Application directory override (default: directory of the running
    /// executable).
    pub app_dir: Option<PathBuf>,
    /// User-data directory override.
    pub user_dir: Option<PathBuf>,
    /// Keep user data in `<app_dir>/data` (portable). When `false`, the
    /// platform data directory is used instead.
    pub portable: bool,
    /// Entry-point executable that must exist after an install.
    pub entry_point: String,
    /// Package file extension selected from release assets.
    pub package_extension: String,
    /// Database file inside the user-data directory (also holds history).
    pub database_file: String,
    /// Files always carried over from the previous install, overwriting
    /// whatever the new package ships.
    pub singleton_files: Vec<String>,
    /// Directories merged from the previous install without overwriting.
    pub merge_dirs: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        let database_file = "airdocs.db".to_owned();
        Self {
            app_dir: None,
            user_dir: None,
            portable: true,
            entry_point: default_entry_point().to_owned(),
            package_extension: ".zip".to_owned(),
            singleton_files: vec![
                database_file.clone(),
                "config_override.yaml".to_owned(),
                CHECK_STATE_NAME.to_owned(),
            ],
            database_file,
            merge_dirs: [
                "logs",
                "output",
                "backups",
                "updates",
                "awb_editor_exchange",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

fn default_entry_point() -> &'static str {
    if cfg!(target_os = "windows") {
        "airdocs.exe"
    } else {
        "airdocs"
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
