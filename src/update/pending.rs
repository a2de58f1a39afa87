//! Staged-update marker.
//!
//! The marker is the only state that survives between the process that
//! downloads an update and the next process start that applies it. It is
//! written after a successful extraction and deleted on commit; every
//! failure before commit leaves it in place so the user can retry.

use crate::app_dirs::InstallLayout;
use crate::config::Channel;
use crate::error::{Result, UpdateError};
use crate::update::checker::UpdateInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of the `.pending_update` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdateMarker {
    pub version: String,
    /// Extracted package tree. Relative paths resolve against the
    /// user-data directory.
    pub extracted_path: PathBuf,
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default, alias = "size")]
    pub size_bytes: u64,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub channel: Channel,
    /// RFC 3339 time the download finished.
    #[serde(default)]
    pub download_timestamp: String,
    /// Wall-clock download time, recorded in the history.
    #[serde(default)]
    pub download_duration_secs: f64,
}

impl PendingUpdateMarker {
    /// Build a marker for an update that has been downloaded and extracted.
    pub fn from_update(
        info: &UpdateInfo,
        extracted_path: PathBuf,
        download_duration_secs: f64,
    ) -> Self {
        Self {
            version: info.version.clone(),
            extracted_path,
            url: info.url.clone(),
            sha256: info.sha256.clone(),
            size_bytes: info.size_bytes,
            release_date: info.release_date.clone(),
            release_notes: info.release_notes.clone(),
            channel: info.channel,
            download_timestamp: chrono::Utc::now().to_rfc3339(),
            download_duration_secs,
        }
    }

    /// Absolute extracted-tree path.
    pub fn resolved_extracted_path(&self, user_dir: &Path) -> PathBuf {
        if self.extracted_path.is_absolute() {
            self.extracted_path.clone()
        } else {
            user_dir.join(&self.extracted_path)
        }
    }
}

/// Handle on the marker file of one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdateState {
    path: PathBuf,
}

impl PendingUpdateState {
    /// Marker at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker of the given installation.
    pub fn for_layout(layout: &InstallLayout) -> Self {
        Self::new(layout.pending_marker())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` if a marker file is present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the marker atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Marker`] if the file cannot be written.
    pub fn write(&self, marker: &PendingUpdateMarker) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Marker(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(marker)?;
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)
            .map_err(|e| UpdateError::Marker(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            UpdateError::Marker(format!("cannot write {}: {e}", self.path.display()))
        })?;

        info!(path = %self.path.display(), version = %marker.version, "pending update marker written");
        Ok(())
    }

    /// Read the marker. `Ok(None)` when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Marker`] for unreadable, malformed, or
    /// incomplete markers.
    pub fn read(&self) -> Result<Option<PendingUpdateMarker>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(UpdateError::Marker(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let marker: PendingUpdateMarker = serde_json::from_slice(&bytes)
            .map_err(|e| UpdateError::Marker(format!("malformed marker: {e}")))?;

        if marker.version.trim().is_empty() {
            return Err(UpdateError::Marker("marker has an empty version".to_owned()));
        }
        if marker.extracted_path.as_os_str().is_empty() {
            return Err(UpdateError::Marker(
                "marker has an empty extracted_path".to_owned(),
            ));
        }
        Ok(Some(marker))
    }

    /// Delete the marker. Succeeds if it is already gone.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Marker`] if an existing file cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "pending update marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::Marker(format!(
                "cannot remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
