//! Staged update applied at startup: commit, rollback, user data.

use crate::helpers::{
    external_data_install, portable_install, read, snapshot, stage_update, write,
};
use airdocs_updater::update::{HistoryStore, InstallOutcome};
use airdocs_updater::{NoopSink, UpdaterConfig, run_startup};

#[test]
fn portable_update_commits_and_keeps_user_data() {
    let install = portable_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    write(&layout.user_dir().join(".first_run_done"), b"1");
    write(&layout.check_state_file(), br#"{"auto_update":"always"}"#);

    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(
        &install,
        "2.0.0",
        &[
            (exe.as_str(), "airdocs v2"),
            ("templates/awb.docx", "template v2"),
            ("lib/core.dat", "core"),
            ("data/config_override.yaml", "printer: none"),
            ("data/logs/app.log", "sample log"),
            ("data/logs/README.txt", "log folder"),
        ],
    );

    let ctx = install.restarted();
    let report = run_startup(&ctx, &NoopSink);
    let outcome = report.outcome.expect("apply result");
    assert!(
        matches!(&outcome, InstallOutcome::Committed { version, .. } if version == "2.0.0"),
        "unexpected outcome: {outcome:?}"
    );
    assert!(!report.removed_old_version);

    let app = layout.app_dir();
    assert_eq!(read(&install.entry_point()), b"airdocs v2");
    assert_eq!(read(&app.join("templates/awb.docx")), b"template v2");
    assert_eq!(read(&app.join("lib/core.dat")), b"core");

    let data = layout.user_dir();
    assert_eq!(read(&data.join("config_override.yaml")), b"printer: HP");
    assert_eq!(read(&data.join("logs/app.log")), b"old log");
    assert_eq!(read(&data.join("logs/README.txt")), b"log folder");
    assert_eq!(read(&data.join("output/awb-0001.pdf")), b"%PDF old");
    assert_eq!(read(&data.join(".first_run_done")), b"1");
    assert_eq!(
        read(&layout.check_state_file()),
        br#"{"auto_update":"always"}"#
    );

    assert!(!ctx.pending().exists());
    assert!(!layout.backup_dir().join("data/.pending_update").exists());
    assert!(!layout.extracted_dir("2.0.0").exists());
    assert!(layout.backup_dir().is_dir(), "previous version is kept");

    let records = ctx.history().list(10).expect("history");
    assert_eq!(records.len(), 1);
    assert!(records[0].install_success);
    assert_eq!(records[0].version, "2.0.0");
    assert_eq!(records[0].previous_version, "1.9.3");
    assert!(!records[0].rollback_occurred);
}

#[test]
fn next_start_removes_previous_version() {
    let install = portable_install(UpdaterConfig::default());
    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(&install, "2.0.0", &[(exe.as_str(), "airdocs v2")]);

    let first = run_startup(&install.restarted(), &NoopSink);
    assert!(first.outcome.expect("apply").is_committed());
    assert!(install.ctx.layout.backup_dir().is_dir());

    let second = run_startup(&install.restarted(), &NoopSink);
    assert!(matches!(second.outcome, Ok(InstallOutcome::NothingToApply)));
    assert!(second.removed_old_version);
    assert!(!install.ctx.layout.backup_dir().exists());
    assert_eq!(read(&install.entry_point()), b"airdocs v2");
}

#[test]
fn interrupted_apply_keeps_previous_version_for_recovery() {
    let install = portable_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(&install, "2.0.0", &[(exe.as_str(), "airdocs v2")]);
    let before = snapshot(layout.app_dir());

    // Process killed after the backup rename, halfway through the copy.
    std::fs::rename(layout.app_dir(), layout.backup_dir()).expect("backup rename");
    write(&layout.app_dir().join("templates/awb.docx"), b"template v2");

    for _ in 0..2 {
        let report = run_startup(&install.restarted(), &NoopSink);
        let outcome = report.outcome.expect("apply result");
        assert!(
            matches!(&outcome, InstallOutcome::RecoveryNeeded { backup_dir, .. } if *backup_dir == layout.backup_dir()),
            "unexpected outcome: {outcome:?}"
        );
        assert!(!report.removed_old_version);
        assert_eq!(snapshot(&layout.backup_dir()), before);
    }
}

#[test]
fn failed_install_restores_identical_tree() {
    let install = external_data_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    let before = snapshot(layout.app_dir());

    // No entry point in the package: the post-copy check fails.
    stage_update(&install, "2.0.0", &[("templates/awb.docx", "template v2")]);

    let ctx = install.restarted();
    let report = run_startup(&ctx, &NoopSink);
    let outcome = report.outcome.expect("apply result");
    assert!(
        matches!(&outcome, InstallOutcome::RolledBack { error, .. } if error.contains("entry point")),
        "unexpected outcome: {outcome:?}"
    );

    assert_eq!(snapshot(layout.app_dir()), before);
    assert!(!layout.backup_dir().exists());
    assert!(ctx.pending().exists(), "marker is kept for a retry");

    let records = ctx.history().list(10).expect("history");
    assert_eq!(records.len(), 1);
    assert!(!records[0].install_success);
    assert!(records[0].rollback_occurred);
    assert!(
        records[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("entry point"))
    );
}

#[cfg(unix)]
#[test]
fn copy_failure_midway_rolls_back() {
    let install = external_data_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    let before = snapshot(layout.app_dir());

    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(
        &install,
        "2.0.0",
        &[(exe.as_str(), "airdocs v2"), ("a.dat", "a"), ("z.dat", "z")],
    );
    let extracted = layout.extracted_dir("2.0.0");
    std::os::unix::fs::symlink(extracted.join("does-not-exist"), extracted.join("m.dat"))
        .expect("symlink");

    let report = run_startup(&install.restarted(), &NoopSink);
    let outcome = report.outcome.expect("apply result");
    assert!(
        matches!(outcome, InstallOutcome::RolledBack { .. }),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(snapshot(layout.app_dir()), before);
    assert!(!layout.backup_dir().exists());
}

#[cfg(unix)]
#[test]
fn linked_directory_in_package_is_installed_as_directory() {
    let install = external_data_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(
        &install,
        "2.0.0",
        &[(exe.as_str(), "airdocs v2"), ("lib/qt6/plugin.dat", "plugin")],
    );
    let extracted = layout.extracted_dir("2.0.0");
    std::os::unix::fs::symlink("qt6", extracted.join("lib/qt")).expect("symlink");

    let report = run_startup(&install.restarted(), &NoopSink);
    let outcome = report.outcome.expect("apply result");
    assert!(outcome.is_committed(), "unexpected outcome: {outcome:?}");
    assert_eq!(read(&layout.app_dir().join("lib/qt/plugin.dat")), b"plugin");
    assert_eq!(read(&layout.app_dir().join("lib/qt6/plugin.dat")), b"plugin");
}

#[test]
fn portable_rollback_records_history_in_restored_database() {
    let install = portable_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    stage_update(&install, "2.0.0", &[("readme.txt", "no binary")]);

    let ctx = install.restarted();
    let report = run_startup(&ctx, &NoopSink);
    assert!(matches!(
        report.outcome,
        Ok(InstallOutcome::RolledBack { .. })
    ));
    assert_eq!(read(&install.entry_point()), b"airdocs v1");
    assert_eq!(
        read(&layout.user_dir().join("config_override.yaml")),
        b"printer: HP"
    );

    let records = ctx.history().list(10).expect("history");
    assert_eq!(records.len(), 1);
    assert!(records[0].rollback_occurred);
    assert!(!report.user_message().expect("message").is_empty());
}

#[test]
fn missing_extracted_tree_leaves_install_untouched() {
    let install = external_data_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(&install, "2.0.0", &[(exe.as_str(), "airdocs v2")]);
    std::fs::remove_dir_all(layout.extracted_dir("2.0.0")).expect("remove staged tree");
    let before = snapshot(layout.app_dir());

    let ctx = install.restarted();
    let report = run_startup(&ctx, &NoopSink);
    assert!(report.outcome.is_err());
    assert_eq!(snapshot(layout.app_dir()), before);
    assert!(ctx.history().list(10).expect("history").is_empty());
}
