//! Update availability checks.
//!
//! Two sources are supported. The channel manifest is authoritative and
//! carries a SHA-256 for the package. The release feed ("latest release"
//! JSON) is a fallback that carries no checksum; updates found there are
//! tagged [`UpdateSource::ReleaseFeed`] so callers can see the weaker
//! guarantee. The feed is consulted only when the manifest could not be
//! read; a manifest that answers, even with "up to date" or an entry that
//! fails validation, is final. Every network or parse failure degrades to
//! "no update".

use crate::config::{Channel, CheckConfig};
use crate::update::transport::{Transport, TransportError, UreqTransport};
use crate::update::version::{Version, is_newer};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where an [`UpdateInfo`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// Channel manifest with a package checksum.
    Manifest,
    /// Release-feed fallback; no checksum available.
    ReleaseFeed,
}

/// An available update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub version: String,
    pub url: String,
    /// Expected SHA-256 (hex). `None` when the source provides none.
    pub sha256: Option<String>,
    /// Advertised package size in bytes (0 when unknown).
    pub size_bytes: u64,
    pub release_date: String,
    pub release_notes: String,
    pub channel: Channel,
    pub source: UpdateSource,
}

/// Result of reading the channel manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestCheck {
    /// A newer version is published on the tracked channel.
    Available(UpdateInfo),
    /// The installed version is current for the channel.
    UpToDate,
    /// The channel entry is malformed or its digest is invalid.
    Rejected,
    /// The manifest could not be fetched or parsed, or lacks the channel.
    Unavailable,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    version: String,
    url: String,
    sha256: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    release_date: String,
    #[serde(default)]
    release_notes: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseWire {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<AssetWire>,
}

#[derive(Debug, Deserialize)]
struct AssetWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

/// Checks the configured sources for a newer release.
#[derive(Clone)]
pub struct UpdateChecker {
    transport: Arc<dyn Transport>,
    manifest_url: Option<String>,
    release_url: Option<String>,
    channel: Channel,
    package_extension: String,
}

impl UpdateChecker {
    /// Build a checker from configuration using the `ureq` transport.
    pub fn from_config(check: &CheckConfig, package_extension: &str) -> Self {
        let timeout = check.request_timeout();
        Self::with_transport(
            Arc::new(UreqTransport::new(timeout, timeout)),
            check,
            package_extension,
        )
    }

    /// Build a checker over an explicit transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        check: &CheckConfig,
        package_extension: &str,
    ) -> Self {
        let release_url = check.github_repo.as_ref().map(|repo| {
            format!(
                "{}/repos/{repo}/releases/latest",
                check.release_api_base.trim_end_matches('/')
            )
        });
        Self {
            transport,
            manifest_url: check.manifest_url.clone(),
            release_url,
            channel: check.channel,
            package_extension: package_extension.to_owned(),
        }
    }

    /// Check every configured source, manifest first.
    ///
    /// Returns `None` when no source reports a newer version or every
    /// source failed.
    pub fn check(&self, current_version: &str) -> Option<UpdateInfo> {
        if self.manifest_url.is_none() && self.release_url.is_none() {
            warn!("no update source configured");
            return None;
        }
        if let Some(url) = &self.manifest_url {
            match self.check_manifest(url, current_version) {
                ManifestCheck::Available(info) => return Some(info),
                ManifestCheck::UpToDate | ManifestCheck::Rejected => return None,
                ManifestCheck::Unavailable => {
                    if self.release_url.is_some() {
                        info!("manifest unavailable, trying release feed");
                    }
                }
            }
        }
        self.release_url
            .as_ref()
            .and_then(|url| self.check_release_feed(url, current_version))
    }

    /// Check a channel manifest.
    pub fn check_manifest(&self, url: &str, current_version: &str) -> ManifestCheck {
        info!(url, channel = %self.channel, "checking for updates");

        let body = match self.transport.get_string(url) {
            Ok(body) => body,
            Err(e) => {
                log_network_failure("manifest", &e);
                return ManifestCheck::Unavailable;
            }
        };

        let manifest: serde_json::Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to parse update manifest");
                return ManifestCheck::Unavailable;
            }
        };

        let Some(branch) = manifest.get(self.channel.as_str()) else {
            warn!(channel = %self.channel, "channel not found in manifest");
            return ManifestCheck::Unavailable;
        };

        let entry: ManifestEntry = match serde_json::from_value(branch.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                error!(channel = %self.channel, error = %e, "invalid manifest entry");
                return ManifestCheck::Rejected;
            }
        };

        let sha256 = entry.sha256.trim();
        if !sha256.is_empty() && !is_sha256_hex(sha256) {
            error!(channel = %self.channel, sha256, "manifest sha256 is not a 64-character hex digest");
            return ManifestCheck::Rejected;
        }

        if !is_newer(current_version, &entry.version) {
            info!(current = current_version, available = %entry.version, "no update available");
            return ManifestCheck::UpToDate;
        }

        info!(version = %entry.version, "update available");
        ManifestCheck::Available(UpdateInfo {
            version: entry.version,
            url: entry.url,
            sha256: (!sha256.is_empty()).then(|| sha256.to_owned()),
            size_bytes: entry.size,
            release_date: entry.release_date,
            release_notes: entry.release_notes,
            channel: self.channel,
            source: UpdateSource::Manifest,
        })
    }

    /// Check the release feed. Updates found here carry no checksum.
    /// Prereleases are skipped on the stable channel.
    pub fn check_release_feed(&self, url: &str, current_version: &str) -> Option<UpdateInfo> {
        info!(url, "checking release feed");

        let body = match self.transport.get_string(url) {
            Ok(body) => body,
            Err(TransportError::Status(404)) => {
                info!(url, "no releases published");
                return None;
            }
            Err(e) => {
                log_network_failure("release feed", &e);
                return None;
            }
        };

        let release: ReleaseWire = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "failed to parse release JSON");
                return None;
            }
        };

        let tag = release.tag_name.unwrap_or_default();
        let version = tag.strip_prefix('v').unwrap_or(&tag).to_owned();

        if self.channel == Channel::Stable
            && (release.prerelease || Version::parse(&version).is_prerelease())
        {
            info!(version = %version, "skipping prerelease on the stable channel");
            return None;
        }

        if !is_newer(current_version, &version) {
            info!(current = current_version, available = %version, "no update available");
            return None;
        }

        let Some(asset) = release
            .assets
            .into_iter()
            .find(|a| a.name.ends_with(&self.package_extension))
        else {
            error!(extension = %self.package_extension, "no package asset in latest release");
            return None;
        };

        warn!(
            version = %version,
            "update found via release feed; no checksum available, package integrity cannot be verified"
        );
        Some(UpdateInfo {
            version,
            url: asset.browser_download_url,
            sha256: None,
            size_bytes: asset.size,
            release_date: release.published_at.unwrap_or_default(),
            release_notes: release.body.unwrap_or_default(),
            channel: self.channel,
            source: UpdateSource::ReleaseFeed,
        })
    }
}

fn log_network_failure(source: &str, e: &TransportError) {
    match e {
        TransportError::Status(code) => {
            error!(source, status = code, "HTTP error while checking for updates");
        }
        TransportError::Transport(msg) => {
            warn!(source, error = %msg, "connection failure while checking for updates");
        }
    }
}

/// `true` for a 64-character hexadecimal string.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
