//! The `apply` command run as its own process, the way a launcher runs it.

use crate::helpers::{portable_install, read, stage_update, write};
use airdocs_updater::{UpdaterConfig, logging};
use std::path::Path;
use std::process::{Command, Output};

fn run_apply(app_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_airdocs-updater"))
        .arg("--app-dir")
        .arg(app_dir)
        .args(["--current-version", "1.9.3", "apply"])
        .env_remove("AIRDOCS_APP_DIR")
        .env_remove("AIRDOCS_USER_DIR")
        .output()
        .expect("run airdocs-updater")
}

#[test]
fn apply_opens_no_log_file_inside_the_replaced_tree() {
    let install = portable_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    let exe = install.ctx.config.install.entry_point.clone();
    stage_update(&install, "2.0.0", &[(exe.as_str(), "airdocs v2")]);

    let output = run_apply(layout.app_dir());
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(read(&install.entry_point()), b"airdocs v2");

    let old_logs = layout.backup_dir().join("data/logs");
    assert_eq!(read(&old_logs.join("app.log")), b"old log");
    assert!(
        !logging::log_file(&old_logs).exists(),
        "updater log was created before the backup rename"
    );
    assert!(logging::log_file(&layout.logs_dir()).exists());
}

#[test]
fn apply_on_incomplete_install_fails_and_keeps_backup() {
    let install = portable_install(UpdaterConfig::default());
    let layout = &install.ctx.layout;
    std::fs::rename(layout.app_dir(), layout.backup_dir()).expect("simulate interrupted apply");
    write(&layout.app_dir().join("templates/awb.docx"), b"half");

    let output = run_apply(layout.app_dir());
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&layout.backup_dir().display().to_string()), "{stdout}");

    let exe = &install.ctx.config.install.entry_point;
    assert_eq!(read(&layout.backup_dir().join(exe)), b"airdocs v1");
    assert!(!layout.logs_dir().exists(), "nothing written into the incomplete tree");
}
