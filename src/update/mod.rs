//! Self-update engine for AirDocs.
//!
//! Checks a channel manifest (or the release feed) for a newer version,
//! downloads and verifies the package, extracts it, and stages it behind a
//! marker file. On the next start the staged tree replaces the installed
//! one, with user data carried over and a rollback on any failure.

pub mod applier;
pub mod checker;
pub mod disk;
pub mod downloader;
pub mod extractor;
pub mod fs_ops;
pub mod history;
pub mod pending;
pub mod prepare;
pub mod session;
pub mod state;
pub mod transport;
pub mod user_data;
pub mod verifier;
pub mod version;

pub use applier::{ApplyState, InstallApplier, InstallOutcome, cleanup_old_version, rollback};
pub use checker::{ManifestCheck, UpdateChecker, UpdateInfo, UpdateSource};
pub use downloader::Downloader;
pub use history::{HistoryStore, SqliteHistoryStore, UpdateHistoryRecord};
pub use pending::{PendingUpdateMarker, PendingUpdateState};
pub use prepare::{PreparedUpdate, prepare_update};
pub use session::{UpdateSession, check_in_background};
pub use state::{AutoUpdatePreference, CheckState};
pub use verifier::Verification;
pub use version::{Version, compare_versions, is_newer};
