// SPDX-License-Identifier: MPL-2.0

//! Mirror builder: walks the registry, downloads and verifies every
//! package archive, and stores the result in a content-addressed mirror
//! layout with a manifest and a resume marker.
//!
//! Layout produced under the output directory:
//! `manifest.json`, `archives/<hash>.zip`,
//! `packages/<author>/<name>/<version>/{elm.json,docs.json}`.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::blacklist::{append_fail_log, Blacklist};
use crate::fetch::{Downloader, FetchError};
use crate::pkg_version::PkgVersion;
use crate::project_config::Pkg;
use crate::registry::Registry;
use crate::transport::Transport;

/// Default number of download attempts per item.
pub const MAX_RETRIES: u32 = 3;
/// Default first backoff delay, doubled after every failed attempt.
pub const INITIAL_BACKOFF_SECS: u64 = 2;
/// Default lower bound of the courtesy delay between items.
pub const MIN_DELAY_SECS: f64 = 1.0;
/// Default upper bound of the courtesy delay between items.
pub const MAX_DELAY_SECS: f64 = 3.0;

/// The mirror manifest, mapping every mirrored package version to its
/// archive hash and origin url.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// ISO-8601 UTC timestamp of the mirror run.
    pub generated: String,
    /// Where the packages came from.
    pub source: String,
    /// One entry per mirrored package version.
    pub packages: Vec<ManifestEntry>,
}

/// One mirrored package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Package author.
    pub author: String,
    /// Package name.
    pub name: String,
    /// Version, rendered as `Major.Minor.Patch`.
    pub version: String,
    /// SHA-1 of the archive, 40 lowercase hex digits.
    pub hash: String,
    /// Url the archive was downloaded from.
    pub url: String,
}

/// Error type for mirror runs.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// A filesystem operation failed.
    #[error("mirror io error on {path}")]
    FileIo {
        /// Path involved in the failing operation.
        path: String,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// The existing manifest could not be decoded.
    #[error("failed to decode manifest {path}")]
    Json {
        /// Path of the manifest.
        path: String,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration of one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Output directory of the mirror layout.
    pub output_dir: PathBuf,
    /// Path of the manifest, `<output_dir>/manifest.json` by default.
    pub manifest_path: PathBuf,
    /// Path of the resume marker (`mirror-since.txt`).
    pub marker_path: PathBuf,
    /// Re-process items below the resume marker or already manifested.
    pub full: bool,
    /// Only mirror the newest version of each package.
    pub latest_only: bool,
    /// Restrict the run to these packages; empty means all.
    pub packages: Vec<Pkg>,
    /// Report the queue without downloading anything.
    pub dry_run: bool,
    /// Append failures to this file in blacklist format.
    pub fail_log: Option<PathBuf>,
    /// Recorded in the manifest `source` field.
    pub source: String,
    /// Download attempts per item.
    pub max_retries: u32,
    /// First backoff delay.
    pub initial_backoff: Duration,
    /// Courtesy delay bounds between items, in seconds.
    pub delay_secs: (f64, f64),
}

impl MirrorConfig {
    /// Standard configuration for an output directory and tool home.
    pub fn new<P: Into<PathBuf>>(output_dir: P, marker_path: PathBuf, source: String) -> Self {
        let output_dir = output_dir.into();
        Self {
            manifest_path: output_dir.join("manifest.json"),
            marker_path,
            output_dir,
            full: false,
            latest_only: false,
            packages: Vec::new(),
            dry_run: false,
            fail_log: None,
            source,
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_secs(INITIAL_BACKOFF_SECS),
            delay_secs: (MIN_DELAY_SECS, MAX_DELAY_SECS),
        }
    }
}

/// Summary of a mirror run.
#[derive(Debug, Default)]
pub struct MirrorReport {
    /// Items that were queued for download.
    pub queued: Vec<PkgVersion>,
    /// Items downloaded and recorded in the manifest.
    pub processed: usize,
    /// Items that failed; the run continues past them.
    pub failed: usize,
    /// Items skipped by marker, manifest, blacklist or filters.
    pub skipped: usize,
}

/// The mirror builder itself.
pub struct MirrorBuilder<'a, T: Transport> {
    downloader: &'a Downloader<'a, T>,
    registry: &'a Registry,
    blacklist: &'a Blacklist,
    config: MirrorConfig,
}

impl<'a, T: Transport> MirrorBuilder<'a, T> {
    /// Create a mirror builder over a downloader and a loaded registry.
    pub fn new(
        downloader: &'a Downloader<'a, T>,
        registry: &'a Registry,
        blacklist: &'a Blacklist,
        config: MirrorConfig,
    ) -> Self {
        Self {
            downloader,
            registry,
            blacklist,
            config,
        }
    }

    /// Run the mirror pass.
    pub fn run(&self) -> Result<MirrorReport, MirrorError> {
        let mut manifest = self.load_existing_manifest()?;
        let already: std::collections::BTreeSet<(String, String, String)> = manifest
            .packages
            .iter()
            .map(|e| (e.author.clone(), e.name.clone(), e.version.clone()))
            .collect();
        let marker = if self.config.full {
            0
        } else {
            read_marker(&self.config.marker_path)
        };

        let mut report = MirrorReport::default();
        let mut max_seq: u64 = 0;
        let mut queue: Vec<PkgVersion> = Vec::new();
        for (seq, pv) in self.registry.iter_versions().enumerate() {
            let seq = seq as u64 + 1;
            max_seq = seq;
            if !self.config.packages.is_empty()
                && !self.config.packages.contains(&pv.author_pkg)
            {
                report.skipped += 1;
                continue;
            }
            if self.config.latest_only {
                let newest = self
                    .registry
                    .find(&pv.author_pkg)
                    .and_then(|entry| entry.newest());
                if newest != Some(pv.version) {
                    report.skipped += 1;
                    continue;
                }
            }
            if self.blacklist.contains(&pv) {
                report.skipped += 1;
                continue;
            }
            if !self.config.full {
                if seq <= marker {
                    report.skipped += 1;
                    continue;
                }
                let key = (
                    pv.author_pkg.author.clone(),
                    pv.author_pkg.pkg.clone(),
                    pv.version.to_string(),
                );
                if already.contains(&key) {
                    report.skipped += 1;
                    continue;
                }
            }
            queue.push(pv);
        }

        log::info!("mirror queue holds {} items", queue.len());
        if self.config.dry_run {
            for pv in &queue {
                log::info!("would mirror {}", pv);
            }
            report.queued = queue;
            return Ok(report);
        }

        let total = queue.len();
        for (index, pv) in queue.iter().enumerate() {
            match self.process(pv) {
                Ok(entry) => {
                    manifest.packages.push(entry);
                    report.processed += 1;
                }
                Err(err) => {
                    log::warn!("mirroring {} failed: {}", pv, err);
                    report.failed += 1;
                    if let Some(fail_log) = &self.config.fail_log {
                        let _ = append_fail_log(fail_log, pv, &err.to_string());
                    }
                }
            }
            if index + 1 < total {
                self.courtesy_sleep();
            }
        }
        report.queued = queue;

        manifest.generated = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        manifest.source = self.config.source.clone();
        self.write_manifest(&manifest)?;
        write_marker(&self.config.marker_path, max_seq)?;
        Ok(report)
    }

    /// Download, verify and store one package version.
    fn process(&self, pv: &PkgVersion) -> Result<ManifestEntry, FetchError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;
        let (endpoint, archive) = loop {
            let result = self
                .downloader
                .ensure_metadata(pv)
                .and_then(|()| self.downloader.read_endpoint(pv))
                .and_then(|endpoint| {
                    self.downloader
                        .download_verified_archive(pv, &endpoint)
                        .map(|archive| (endpoint, archive))
                });
            match result {
                Ok(ok) => break ok,
                Err(err @ (FetchError::Offline { .. } | FetchError::HashMismatch { .. })) => {
                    return Err(err)
                }
                Err(err) if attempt >= self.config.max_retries => return Err(err),
                Err(err) => {
                    log::warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt,
                        self.config.max_retries,
                        pv,
                        err
                    );
                    // Remove any partial package directory before retrying.
                    self.downloader.cache().remove(pv)?;
                    std::thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
            }
        };

        // Store the archive by hash, deduplicated.
        let archives_dir = self.config.output_dir.join("archives");
        let archive_dest = archives_dir.join(format!("{}.zip", archive.hash));
        if !archive_dest.exists() {
            copy_file(archive.path(), &archive_dest).map_err(fetch_io)?;
        }

        // Copy the two config files into the mirror package layout.
        let pkg_dir = self
            .config
            .output_dir
            .join("packages")
            .join(&pv.author_pkg.author)
            .join(&pv.author_pkg.pkg)
            .join(pv.version.to_string());
        for file in ["elm.json", "docs.json"] {
            let from = self.downloader.cache().metadata_path(pv, file);
            copy_file(&from, &pkg_dir.join(file)).map_err(fetch_io)?;
        }

        log::info!("mirrored {} ({})", pv, archive.hash);
        Ok(ManifestEntry {
            author: pv.author_pkg.author.clone(),
            name: pv.author_pkg.pkg.clone(),
            version: pv.version.to_string(),
            hash: archive.hash.clone(),
            url: endpoint.url,
        })
    }

    fn courtesy_sleep(&self) {
        let (min, max) = self.config.delay_secs;
        if max <= 0.0 {
            return;
        }
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        std::thread::sleep(Duration::from_secs_f64(secs));
    }

    fn load_existing_manifest(&self) -> Result<Manifest, MirrorError> {
        let path = &self.config.manifest_path;
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| MirrorError::Json {
                path: path.display().to_string(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(source) => Err(MirrorError::FileIo {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), MirrorError> {
        let path = &self.config.manifest_path;
        let io_err = |source| MirrorError::FileIo {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(manifest).map_err(|source| MirrorError::Json {
            path: path.display().to_string(),
            source,
        })?;
        let io_err = |source| MirrorError::FileIo {
            path: path.display().to_string(),
            source,
        };
        let staged = path.with_extension("json.new");
        std::fs::write(&staged, text.as_bytes()).map_err(io_err)?;
        let io_err = |source| MirrorError::FileIo {
            path: path.display().to_string(),
            source,
        };
        std::fs::rename(&staged, path).map_err(io_err)
    }
}

/// Read the resume marker: a single decimal sequence number.
/// Missing or unreadable markers count as zero.
pub fn read_marker(path: &Path) -> u64 {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(0)
}

/// Persist the resume marker, newline terminated.
pub fn write_marker(path: &Path, seq: u64) -> Result<(), MirrorError> {
    let io_err = |source| MirrorError::FileIo {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let io_err = |source| MirrorError::FileIo {
        path: path.display().to_string(),
        source,
    };
    std::fs::write(path, format!("{}\n", seq)).map_err(io_err)
}

fn copy_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to).map(|_| ())
}

fn fetch_io(source: std::io::Error) -> FetchError {
    FetchError::FileSystem {
        path: "mirror output".to_string(),
        source,
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror-since.txt");
        assert_eq!(read_marker(&path), 0);
        write_marker(&path, 42).unwrap();
        assert_eq!(read_marker(&path), 42);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "42\n");
    }

    #[test]
    fn manifest_serde_shape() {
        let manifest = Manifest {
            generated: "2024-01-01T00:00:00Z".to_string(),
            source: "https://registry.test".to_string(),
            packages: vec![ManifestEntry {
                author: "elm".to_string(),
                name: "core".to_string(),
                version: "1.0.0".to_string(),
                hash: "0".repeat(40),
                url: "https://archives.test/a.zip".to_string(),
            }],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"generated\""));
        assert!(json.contains("\"packages\""));
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.packages, manifest.packages);
    }
}
