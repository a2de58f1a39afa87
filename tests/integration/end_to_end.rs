//! Check, stage, restart, apply: the whole update across two process runs.

use crate::helpers::{build_package, fast_config, portable_install, read, sha256_hex};
use airdocs_updater::update::verifier::sha256_file;
use airdocs_updater::update::{
    HistoryStore, InstallOutcome, UpdateSource, Verification, prepare_update,
};
use airdocs_updater::{NoopSink, run_startup};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn manifest_update_is_staged_then_applied_on_restart() {
    let server = MockServer::start().await;
    let mut config = fast_config();
    config.check.manifest_url = Some(format!("{}/manifest.json", server.uri()));
    let exe = config.install.entry_point.clone();

    let package = build_package(&[
        (exe.as_str(), "airdocs v2"),
        ("templates/awb.docx", "template v2"),
        ("lib/core.dat", "core"),
    ]);
    let package_sha = sha256_hex(&package);

    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latest": {
                "version": "2.0.0",
                "url": format!("{}/airdocs-2.0.0.zip", server.uri()),
                "sha256": package_sha,
                "size": package.len(),
                "release_date": "2026-10-01",
                "release_notes": "Faster AWB export"
            },
            "stable": {
                "version": "1.9.3",
                "url": format!("{}/airdocs-1.9.3.zip", server.uri()),
                "sha256": ""
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/airdocs-2.0.0.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(package.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let install = portable_install(config);

    // First run: check and stage.
    let ctx = install.ctx.clone();
    let info = tokio::task::spawn_blocking(move || ctx.checker().check(&ctx.current_version))
        .await
        .expect("join")
        .expect("update available");
    assert_eq!(info.version, "2.0.0");
    assert_eq!(info.source, UpdateSource::Manifest);
    assert_eq!(info.sha256.as_deref(), Some(package_sha.as_str()));
    assert_eq!(info.release_notes, "Faster AWB export");

    let ctx = install.ctx.clone();
    let staged_info = info.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        prepare_update(&ctx, &staged_info, &NoopSink, &CancellationToken::new())
    })
    .await
    .expect("join")
    .expect("prepare");

    assert_eq!(prepared.verification, Verification::Verified);
    assert!(!prepared.reused_package);
    assert_eq!(prepared.extraction.files, 3);
    assert_eq!(sha256_file(&prepared.package).expect("hash"), package_sha);
    assert!(install.ctx.pending().exists());
    assert_eq!(
        read(&install.entry_point()),
        b"airdocs v1",
        "nothing is replaced before restart"
    );

    // Second run: apply before anything else opens the install.
    let ctx = install.restarted();
    let report = run_startup(&ctx, &NoopSink);
    let outcome = report.outcome.expect("apply");
    assert!(
        matches!(&outcome, InstallOutcome::Committed { version, .. } if version == "2.0.0"),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(read(&install.entry_point()), b"airdocs v2");
    assert!(!ctx.pending().exists());

    let records = ctx.history().list(10).expect("history");
    assert_eq!(records.len(), 1);
    assert!(records[0].install_success);
    assert_eq!(records[0].version, "2.0.0");
    assert_eq!(records[0].download_size, package.len() as u64);
}

#[tokio::test]
async fn corrupted_download_is_rejected_and_deleted() {
    let server = MockServer::start().await;
    let mut config = fast_config();
    config.check.manifest_url = Some(format!("{}/manifest.json", server.uri()));

    let package = build_package(&[("airdocs", "v2")]);
    let mut tampered = package.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latest": {
                "version": "2.0.0",
                "url": format!("{}/p.zip", server.uri()),
                "sha256": sha256_hex(&package),
                "size": package.len()
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tampered))
        .mount(&server)
        .await;

    let install = portable_install(config);
    let ctx = install.ctx.clone();
    let result = tokio::task::spawn_blocking(move || {
        let info = ctx.checker().check("1.9.3").expect("update available");
        prepare_update(&ctx, &info, &NoopSink, &CancellationToken::new())
    })
    .await
    .expect("join");

    assert!(matches!(
        result,
        Err(airdocs_updater::UpdateError::Verification { .. })
    ));
    let layout = &install.ctx.layout;
    assert!(!layout.package_path("2.0.0", ".zip").exists());
    assert!(!layout.extracted_dir("2.0.0").exists());
    assert!(!install.ctx.pending().exists());
}
