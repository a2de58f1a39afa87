//! Falling back to the release feed when the manifest is unavailable.

use crate::helpers::{build_package, fast_config, portable_install};
use airdocs_updater::update::{UpdateSource, Verification, prepare_update};
use airdocs_updater::NoopSink;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn missing_manifest_falls_back_to_release_feed() {
    let server = MockServer::start().await;
    let mut config = fast_config();
    config.check.manifest_url = Some(format!("{}/manifest.json", server.uri()));
    config.check.github_repo = Some("airdocs/airdocs".to_owned());
    config.check.release_api_base = server.uri();
    let exe = config.install.entry_point.clone();
    let package = build_package(&[(exe.as_str(), "airdocs v2.1")]);

    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/airdocs/airdocs/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": "v2.1.0",
            "body": "Bug fixes",
            "published_at": "2026-10-10T09:00:00Z",
            "assets": [
                { "name": "checksums.txt", "browser_download_url": format!("{}/checksums.txt", server.uri()), "size": 64 },
                { "name": "AirDocs-2.1.0.zip", "browser_download_url": format!("{}/AirDocs-2.1.0.zip", server.uri()), "size": package.len() }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/AirDocs-2.1.0.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(package))
        .mount(&server)
        .await;

    let install = portable_install(config);
    let ctx = install.ctx.clone();
    let (info, prepared) = tokio::task::spawn_blocking(move || {
        let info = ctx.checker().check("1.9.3").expect("update available");
        let prepared = prepare_update(&ctx, &info, &NoopSink, &CancellationToken::new());
        (info, prepared)
    })
    .await
    .expect("join");

    assert_eq!(info.version, "2.1.0");
    assert_eq!(info.source, UpdateSource::ReleaseFeed);
    assert!(info.sha256.is_none());
    assert!(info.url.ends_with("AirDocs-2.1.0.zip"));

    let prepared = prepared.expect("prepare");
    assert_eq!(prepared.verification, Verification::Skipped);
    assert_eq!(prepared.extraction.files, 1);
    assert!(install.ctx.pending().exists());
}

#[tokio::test]
async fn no_published_release_means_no_update() {
    let server = MockServer::start().await;
    let mut config = fast_config();
    config.check.github_repo = Some("airdocs/airdocs".to_owned());
    config.check.release_api_base = server.uri();

    Mock::given(method("GET"))
        .and(path("/repos/airdocs/airdocs/releases/latest"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let install = portable_install(config);
    let ctx = install.ctx.clone();
    let found = tokio::task::spawn_blocking(move || ctx.checker().check("1.9.3"))
        .await
        .expect("join");
    assert!(found.is_none());
}

#[tokio::test]
async fn older_release_is_not_offered() {
    let server = MockServer::start().await;
    let mut config = fast_config();
    config.check.github_repo = Some("airdocs/airdocs".to_owned());
    config.check.release_api_base = server.uri();

    Mock::given(method("GET"))
        .and(path("/repos/airdocs/airdocs/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": "v1.9.3",
            "assets": [{ "name": "AirDocs.zip", "browser_download_url": "http://x/AirDocs.zip", "size": 1 }]
        })))
        .mount(&server)
        .await;

    let install = portable_install(config);
    let ctx = install.ctx.clone();
    let found = tokio::task::spawn_blocking(move || ctx.checker().check("1.9.3"))
        .await
        .expect("join");
    assert!(found.is_none());
}
