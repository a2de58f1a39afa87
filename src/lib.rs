//! AirDocs updater: self-update and installer engine.
//!
//! The engine checks a release channel for a newer version, downloads and
//! verifies the package, and stages it. On the next start, before the
//! application opens its database, the staged tree replaces the installed
//! one while user data is carried across. Any failure restores the previous
//! installation.
//!
//! # Flow
//!
//! - [`update::UpdateChecker`] finds an [`update::UpdateInfo`]
//! - [`update::prepare_update`] downloads, verifies, extracts, and writes
//!   the pending marker
//! - [`startup::run_startup`] applies the marker on the next start
//!
//! All operations take an explicit [`UpdateContext`]; there is no global
//! state.

pub mod app_dirs;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod progress;
pub mod startup;
pub mod update;

pub use app_dirs::InstallLayout;
pub use config::{Channel, UpdaterConfig};
pub use context::UpdateContext;
pub use error::{Result, UpdateError};
pub use progress::{
    ConfirmationPort, NoopSink, ProgressCallback, ProgressEvent, ProgressSink, Stage,
};
pub use startup::{StartupReport, pending_update_notice, run_startup};
