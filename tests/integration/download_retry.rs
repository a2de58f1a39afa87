//! Downloader against a real HTTP server.

use airdocs_updater::config::DownloadConfig;
use airdocs_updater::update::Downloader;
use airdocs_updater::update::downloader::temp_path;
use airdocs_updater::{NoopSink, UpdateError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader() -> Downloader {
    let config = DownloadConfig {
        max_attempts: 3,
        backoff_ms: vec![0],
        ..DownloadConfig::default()
    };
    Downloader::from_config(&config, Duration::from_secs(5))
}

#[tokio::test]
async fn server_errors_exhaust_retries_without_leftovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/airdocs-2.0.0.zip"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("updates/update_2.0.0.zip");
    let url = format!("{}/airdocs-2.0.0.zip", server.uri());

    let d = dest.clone();
    let result = tokio::task::spawn_blocking(move || downloader().download(&url, &d, &NoopSink))
        .await
        .expect("join");

    match result {
        Err(UpdateError::Download { attempts, last_error }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("500"), "last error: {last_error}");
        }
        other => panic!("expected download error, got {other:?}"),
    }
    assert!(!dest.exists());
    assert!(!temp_path(&dest).exists());
}

#[tokio::test]
async fn successful_download_writes_exact_bytes() {
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pkg.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("pkg.zip");
    let url = format!("{}/pkg.zip", server.uri());

    let d = dest.clone();
    let written = tokio::task::spawn_blocking(move || downloader().download(&url, &d, &NoopSink))
        .await
        .expect("join")
        .expect("download");

    assert_eq!(written, body.len() as u64);
    assert_eq!(std::fs::read(&dest).expect("read"), body);
    assert!(!temp_path(&dest).exists());
}

#[tokio::test]
async fn unreachable_host_reports_download_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("pkg.zip");

    let d = dest.clone();
    let result = tokio::task::spawn_blocking(move || {
        downloader().download("http://127.0.0.1:9/pkg.zip", &d, &NoopSink)
    })
    .await
    .expect("join");

    assert!(matches!(result, Err(UpdateError::Download { attempts: 3, .. })));
    assert!(!dest.exists());
    assert!(!temp_path(&dest).exists());
}
