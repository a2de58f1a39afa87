//! Shared fixtures for integration tests.

use airdocs_updater::config::Channel;
use airdocs_updater::update::{PendingUpdateMarker, PendingUpdateState, SqliteHistoryStore};
use airdocs_updater::{InstallLayout, UpdateContext, UpdaterConfig};
use sha2::Digest;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub(crate) fn write(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
    std::fs::write(path, content).expect("write file");
}

pub(crate) fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

/// Zip archive bytes with the given entries.
pub(crate) fn build_package(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .expect("start entry");
            zip.write_all(data.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish zip");
    }
    cursor.into_inner()
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", sha2::Sha256::digest(bytes))
}

/// Every file below `root` with its contents, keyed by relative path.
pub(crate) fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).expect("under root").to_path_buf();
            (rel, read(e.path()))
        })
        .collect()
}

/// An installed AirDocs running `current_version`.
pub(crate) struct Install {
    _root: tempfile::TempDir,
    pub ctx: UpdateContext,
}

impl Install {
    pub fn entry_point(&self) -> PathBuf {
        self.ctx
            .layout
            .app_dir()
            .join(&self.ctx.config.install.entry_point)
    }

    /// Same installation as seen by a freshly started process.
    pub fn restarted(&self) -> UpdateContext {
        UpdateContext::new(
            self.ctx.config.clone(),
            self.ctx.layout.clone(),
            &self.ctx.current_version,
        )
    }
}

fn populate(layout: &InstallLayout, config: &UpdaterConfig) {
    write(
        &layout.app_dir().join(&config.install.entry_point),
        b"airdocs v1",
    );
    write(&layout.app_dir().join("templates/awb.docx"), b"template v1");
    let db = layout.database(&config.install);
    SqliteHistoryStore::create(&db).expect("create user database");
    write(&layout.user_dir().join("config_override.yaml"), b"printer: HP");
    write(&layout.user_dir().join("logs/app.log"), b"old log");
    write(&layout.user_dir().join("output/awb-0001.pdf"), b"%PDF old");
}

/// Portable install: user data in `<App>/data`.
pub(crate) fn portable_install(config: UpdaterConfig) -> Install {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = InstallLayout::portable(dir.path().join("AirDocs"));
    populate(&layout, &config);
    let ctx = UpdateContext::new(config, layout, "1.9.3");
    Install { _root: dir, ctx }
}

/// Install with user data outside the application directory.
pub(crate) fn external_data_install(config: UpdaterConfig) -> Install {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = InstallLayout::new(dir.path().join("AirDocs"), dir.path().join("UserData"));
    populate(&layout, &config);
    let ctx = UpdateContext::new(config, layout, "1.9.3");
    Install { _root: dir, ctx }
}

/// Place an extracted tree and a marker as the preparation step would.
pub(crate) fn stage_update(install: &Install, version: &str, files: &[(&str, &str)]) {
    let layout = &install.ctx.layout;
    let extracted = layout.extracted_dir(version);
    for (name, content) in files {
        write(&extracted.join(name), content.as_bytes());
    }
    let marker = PendingUpdateMarker {
        version: version.to_owned(),
        extracted_path: extracted,
        url: format!("https://updates.example.com/airdocs-{version}.zip"),
        sha256: None,
        size_bytes: 2048,
        release_date: "2026-10-01".to_owned(),
        release_notes: String::new(),
        channel: Channel::Latest,
        download_timestamp: "2026-10-02T08:00:00+00:00".to_owned(),
        download_duration_secs: 2.0,
    };
    PendingUpdateState::for_layout(layout)
        .write(&marker)
        .expect("write marker");
}

/// Config with instant retries.
pub(crate) fn fast_config() -> UpdaterConfig {
    let mut config = UpdaterConfig::default();
    config.download.backoff_ms = vec![0];
    config
}
