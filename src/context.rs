//! Explicit context handed to every update operation.

use crate::app_dirs::InstallLayout;
use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::update::checker::UpdateChecker;
use crate::update::downloader::Downloader;
use crate::update::history::{HistoryStore, SqliteHistoryStore};
use crate::update::pending::PendingUpdateState;
use std::sync::Arc;

/// Configuration, resolved layout, running version, and history store for
/// one installation. Built once at startup and passed by reference.
#[derive(Clone)]
pub struct UpdateContext {
    pub config: UpdaterConfig,
    pub layout: InstallLayout,
    /// Version of the running application.
    pub current_version: String,
    history: Arc<dyn HistoryStore>,
}

impl UpdateContext {
    /// Build a context whose history goes to the user database.
    pub fn new(config: UpdaterConfig, layout: InstallLayout, current_version: &str) -> Self {
        let history = Arc::new(SqliteHistoryStore::new(layout.database(&config.install)));
        Self {
            config,
            layout,
            current_version: current_version.to_owned(),
            history,
        }
    }

    /// Resolve the layout from config and environment, then build.
    ///
    /// # Errors
    ///
    /// Returns an error if the application directory cannot be determined.
    pub fn resolve(config: UpdaterConfig, current_version: &str) -> Result<Self> {
        let layout = InstallLayout::resolve(&config.install)?;
        Ok(Self::new(config, layout, current_version))
    }

    /// Replace the history store.
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    /// Marker handle for this installation.
    pub fn pending(&self) -> PendingUpdateState {
        PendingUpdateState::for_layout(&self.layout)
    }

    /// Checker over the configured sources.
    pub fn checker(&self) -> UpdateChecker {
        UpdateChecker::from_config(&self.config.check, &self.config.install.package_extension)
    }

    /// Downloader using the configured retry policy.
    pub fn downloader(&self) -> Downloader {
        Downloader::from_config(&self.config.download, self.config.check.request_timeout())
    }
}

impl std::fmt::Debug for UpdateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateContext")
            .field("layout", &self.layout)
            .field("current_version", &self.current_version)
            .finish_non_exhaustive()
    }
}
