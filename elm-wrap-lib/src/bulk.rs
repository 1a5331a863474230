// SPDX-License-Identifier: MPL-2.0

//! Bulk downloader: walks the whole registry and fills the package
//! cache, re-downloading broken entries and skipping blacklisted ones.
//!
//! Shares the scan, retry and courtesy-delay behavior of the mirror
//! builder but writes directly into the cache instead of a mirror
//! layout.

use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

use crate::blacklist::{append_fail_log, Blacklist};
use crate::cache::CacheStatus;
use crate::fetch::{Downloader, FetchError};
use crate::mirror::{INITIAL_BACKOFF_SECS, MAX_DELAY_SECS, MAX_RETRIES, MIN_DELAY_SECS};
use crate::pkg_version::PkgVersion;
use crate::registry::Registry;
use crate::transport::Transport;

/// Configuration of one bulk download run.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Only download the newest version of each package.
    pub latest_only: bool,
    /// Report the queue without downloading anything.
    pub dry_run: bool,
    /// Append failures to this file in blacklist format.
    pub fail_log: Option<PathBuf>,
    /// Download attempts per item.
    pub max_retries: u32,
    /// First backoff delay.
    pub initial_backoff: Duration,
    /// Courtesy delay bounds between items, in seconds.
    pub delay_secs: (f64, f64),
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            latest_only: false,
            dry_run: false,
            fail_log: None,
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_secs(INITIAL_BACKOFF_SECS),
            delay_secs: (MIN_DELAY_SECS, MAX_DELAY_SECS),
        }
    }
}

/// Summary of a bulk download run.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Items queued for download, in registry order.
    pub queued: Vec<PkgVersion>,
    /// Items downloaded into the cache.
    pub downloaded: usize,
    /// Items that failed; the run continues past them.
    pub failed: usize,
    /// Items already fully cached.
    pub already_cached: usize,
    /// Items skipped through the blacklist or the latest-only filter.
    pub skipped: usize,
}

/// The bulk downloader itself.
pub struct BulkDownloader<'a, T: Transport> {
    downloader: &'a Downloader<'a, T>,
    registry: &'a Registry,
    blacklist: &'a Blacklist,
    config: BulkConfig,
}

impl<'a, T: Transport> BulkDownloader<'a, T> {
    /// Create a bulk downloader over a downloader and a loaded registry.
    pub fn new(
        downloader: &'a Downloader<'a, T>,
        registry: &'a Registry,
        blacklist: &'a Blacklist,
        config: BulkConfig,
    ) -> Self {
        Self {
            downloader,
            registry,
            blacklist,
            config,
        }
    }

    /// Run the bulk download pass.
    pub fn run(&self) -> BulkReport {
        let mut report = BulkReport::default();
        let cache = self.downloader.cache();
        let mut queue: Vec<PkgVersion> = Vec::new();
        for pv in self.registry.iter_versions() {
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
            match cache.status(&pv) {
                CacheStatus::Ok => report.already_cached += 1,
                CacheStatus::Broken | CacheStatus::NotCached => queue.push(pv),
            }
        }

        log::info!("bulk queue holds {} items", queue.len());
        if self.config.dry_run {
            for pv in &queue {
                log::info!("would download {}", pv);
            }
            report.queued = queue;
            return report;
        }

        let total = queue.len();
        for (index, pv) in queue.iter().enumerate() {
            match self.download(pv) {
                Ok(()) => report.downloaded += 1,
                Err(err) => {
                    log::warn!("downloading {} failed: {}", pv, err);
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
        report
    }

    fn download(&self, pv: &PkgVersion) -> Result<(), FetchError> {
        // Broken entries are wiped before the fresh download.
        if self.downloader.cache().status(pv) == CacheStatus::Broken {
            self.downloader.cache().remove(pv)?;
        }
        self.downloader
            .fetch_with_retries(pv, self.config.max_retries, self.config.initial_backoff)
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
}
