// SPDX-License-Identifier: MPL-2.0

//! Module managing the on-disk package cache under `ELM_HOME`.
//!
//! The cache is addressed by (author, name, version). Every cached package
//! version lives in its own directory holding the metadata triplet
//! (`endpoint.json`, `elm.json`, `docs.json`) and, once fully downloaded,
//! the extracted `src/` subtree.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::pkg_version::PkgVersion;
use crate::project_config::{PackageConfig, Pkg};
use crate::version::Version;

/// Names of the three metadata files of a cached package version.
pub const METADATA_FILES: [&str; 3] = ["endpoint.json", "elm.json", "docs.json"];

/// Completeness of a cached package version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Metadata triplet present and `src/` present and non-empty.
    Ok,
    /// Metadata present but `src/` absent or empty.
    Broken,
    /// Nothing, or only part of the metadata, on disk.
    NotCached,
}

/// Error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A filesystem operation on the cache failed.
    #[error("cache io error on {path}")]
    FileIo {
        /// Path involved in the failing operation.
        path: String,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// A cached `elm.json` could not be decoded.
    #[error("failed to decode cached config of {pkg_version}")]
    Json {
        /// The package version whose config is unreadable.
        pkg_version: PkgVersion,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Handle on the package cache of one compiler version.
///
/// All paths derive from `ELM_HOME/<compiler_version>/packages`.
#[derive(Debug, Clone)]
pub struct PackageCache {
    elm_home: PathBuf,
    compiler_version: String,
}

impl PackageCache {
    /// Create a cache handle rooted at the given `ELM_HOME`.
    pub fn new<P: Into<PathBuf>, S: ToString>(elm_home: P, compiler_version: S) -> Self {
        Self {
            elm_home: elm_home.into(),
            compiler_version: compiler_version.to_string(),
        }
    }

    /// The `ELM_HOME` this cache is rooted at.
    pub fn elm_home(&self) -> &Path {
        &self.elm_home
    }

    /// Root of the per-compiler packages directory.
    pub fn packages_root(&self) -> PathBuf {
        self.elm_home
            .join(&self.compiler_version)
            .join("packages")
    }

    /// Path to the binary registry index inside the cache.
    pub fn registry_path(&self) -> PathBuf {
        self.packages_root().join("registry.dat")
    }

    /// Directory of one package version.
    pub fn package_dir(&self, pv: &PkgVersion) -> PathBuf {
        self.packages_root()
            .join(&pv.author_pkg.author)
            .join(&pv.author_pkg.pkg)
            .join(pv.version.to_string())
    }

    /// Path of one of the three metadata files of a package version.
    pub fn metadata_path(&self, pv: &PkgVersion, file: &str) -> PathBuf {
        self.package_dir(pv).join(file)
    }

    /// Path of the extracted sources of a package version.
    pub fn src_dir(&self, pv: &PkgVersion) -> PathBuf {
        self.package_dir(pv).join("src")
    }

    /// Check that the metadata triplet is fully present.
    pub fn metadata_exists(&self, pv: &PkgVersion) -> bool {
        METADATA_FILES
            .iter()
            .all(|file| self.metadata_path(pv, file).is_file())
    }

    /// Check that the package version is fully downloaded:
    /// metadata present and `src/` present and non-empty.
    pub fn fully_downloaded(&self, pv: &PkgVersion) -> bool {
        self.metadata_exists(pv) && dir_is_non_empty(&self.src_dir(pv))
    }

    /// Classify the completeness of a cached package version.
    pub fn status(&self, pv: &PkgVersion) -> CacheStatus {
        if !self.metadata_exists(pv) {
            CacheStatus::NotCached
        } else if dir_is_non_empty(&self.src_dir(pv)) {
            CacheStatus::Ok
        } else {
            CacheStatus::Broken
        }
    }

    /// Recursively delete the directory of a package version.
    pub fn remove(&self, pv: &PkgVersion) -> Result<(), CacheError> {
        let dir = self.package_dir(pv);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|source| CacheError::FileIo {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Load the cached `elm.json` of a package version.
    pub fn load_config(&self, pv: &PkgVersion) -> Result<PackageConfig, CacheError> {
        let path = self.metadata_path(pv, "elm.json");
        let config_str = std::fs::read_to_string(&path).map_err(|source| CacheError::FileIo {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&config_str).map_err(|source| CacheError::Json {
            pkg_version: pv.clone(),
            source,
        })
    }

    /// List installed versions of a package, sorted ascending.
    pub fn list_installed_versions(&self, pkg: &Pkg) -> Vec<Version> {
        let p_dir = self.packages_root().join(&pkg.author).join(&pkg.pkg);
        let sub_dirs = match std::fs::read_dir(&p_dir) {
            Ok(s) => s,
            Err(_) => {
                // The directory does not exist so probably
                // no version of this package have ever been installed.
                return Vec::new();
            }
        };
        let mut versions: Vec<Version> = sub_dirs
            .filter_map(|f| f.ok())
            // only keep directories
            .filter(|entry| entry.file_type().map(|f| f.is_dir()).unwrap_or(false))
            // retrieve the directory name as a string
            .filter_map(|entry| entry.file_name().into_string().ok())
            // convert into a version
            .filter_map(|s| Version::from_str(&s).ok())
            .collect();
        versions.sort();
        versions
    }

    /// Write a file into the cache through a staged sibling path,
    /// renamed in once fully written.
    pub fn write_file_staged(&self, path: &Path, content: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let staged = staged_path(path);
        std::fs::write(&staged, content).map_err(|e| io_err(&staged, e))?;
        std::fs::rename(&staged, path).map_err(|e| io_err(path, e))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::FileIo {
        path: path.display().to_string(),
        source,
    }
}

fn staged_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".new");
    path.with_file_name(name)
}

fn dir_is_non_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn cache() -> (tempfile::TempDir, PackageCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path(), "0.19.1");
        (dir, cache)
    }

    fn populate_metadata(cache: &PackageCache, pv: &PkgVersion) {
        for file in METADATA_FILES {
            cache
                .write_file_staged(&cache.metadata_path(pv, file), b"{}")
                .unwrap();
        }
    }

    #[test]
    fn status_transitions() {
        let (_dir, cache) = cache();
        let pv = PkgVersion::from_str("elm/core@1.0.0").unwrap();
        assert_eq!(cache.status(&pv), CacheStatus::NotCached);
        assert!(!cache.metadata_exists(&pv));

        populate_metadata(&cache, &pv);
        assert!(cache.metadata_exists(&pv));
        assert_eq!(cache.status(&pv), CacheStatus::Broken);
        assert!(!cache.fully_downloaded(&pv));

        // An empty src/ is still broken.
        std::fs::create_dir_all(cache.src_dir(&pv)).unwrap();
        assert_eq!(cache.status(&pv), CacheStatus::Broken);

        std::fs::write(cache.src_dir(&pv).join("Main.elm"), "module Main").unwrap();
        assert_eq!(cache.status(&pv), CacheStatus::Ok);
        assert!(cache.fully_downloaded(&pv));
    }

    #[test]
    fn partial_metadata_is_not_cached() {
        let (_dir, cache) = cache();
        let pv = PkgVersion::from_str("elm/core@1.0.0").unwrap();
        cache
            .write_file_staged(&cache.metadata_path(&pv, "elm.json"), b"{}")
            .unwrap();
        assert_eq!(cache.status(&pv), CacheStatus::NotCached);
    }

    #[test]
    fn remove_deletes_version_dir() {
        let (_dir, cache) = cache();
        let pv = PkgVersion::from_str("elm/core@1.0.0").unwrap();
        populate_metadata(&cache, &pv);
        assert!(cache.package_dir(&pv).exists());
        cache.remove(&pv).unwrap();
        assert!(!cache.package_dir(&pv).exists());
        // Removing an absent version is fine.
        cache.remove(&pv).unwrap();
    }

    #[test]
    fn list_installed_versions_sorted() {
        let (_dir, cache) = cache();
        for pv_str in ["elm/core@1.0.5", "elm/core@1.0.0", "elm/core@2.0.0"] {
            let pv = PkgVersion::from_str(pv_str).unwrap();
            populate_metadata(&cache, &pv);
        }
        let versions = cache.list_installed_versions(&Pkg::new("elm", "core"));
        assert_eq!(
            versions,
            vec![
                Version::new(1, 0, 0),
                Version::new(1, 0, 5),
                Version::new(2, 0, 0)
            ]
        );
        assert!(cache
            .list_installed_versions(&Pkg::new("no", "body"))
            .is_empty());
    }
}
