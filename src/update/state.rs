//! Update check state persistence.
//!
//! Tracks the auto-update preference, the last check time, and a release
//! the user chose to skip. Persisted to `<user_dir>/update-state.json`.

use crate::error::{Result, UpdateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// User preference for automatic updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUpdatePreference {
    /// Ask before downloading (default).
    #[default]
    Ask,
    /// Download and stage without asking.
    Always,
    /// Never check automatically.
    Never,
}

impl std::fmt::Display for AutoUpdatePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Persistent update check state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckState {
    pub auto_update: AutoUpdatePreference,
    /// Time of the last completed check.
    pub last_check: Option<DateTime<Utc>>,
    /// Release version the user chose to skip.
    pub dismissed_release: Option<String>,
}

impl CheckState {
    /// Load state from `path`. Returns the default state if the file is
    /// missing or cannot be parsed.
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => return Self::default(),
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable check state");
            Self::default()
        })
    }

    /// Persist the state to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Config(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            UpdateError::Config(format!(
                "cannot write check state to {}: {e}",
                path.display()
            ))
        })?;
        Ok(())
    }

    /// Record that a check completed now.
    pub fn mark_checked(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// Returns `true` if the last check was at least `hours` hours ago (or
    /// there was none).
    pub fn check_is_stale(&self, hours: u64) -> bool {
        self.check_is_stale_at(hours, Utc::now())
    }

    fn check_is_stale_at(&self, hours: u64, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_check else {
            return true;
        };
        let elapsed = now.signed_duration_since(last).num_hours();
        elapsed < 0 || elapsed as u64 >= hours
    }

    /// Remember `version` as declined so it is not offered again.
    pub fn dismiss(&mut self, version: &str) {
        self.dismissed_release = Some(version.to_owned());
    }

    /// `true` if `version` is the release the user dismissed.
    pub fn is_dismissed(&self, version: &str) -> bool {
        self.dismissed_release.as_deref() == Some(version)
    }
}
