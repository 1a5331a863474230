// SPDX-License-Identifier: MPL-2.0

//! Module implementing the package fetch pipeline.
//!
//! The positive path for one package version is:
//! metadata triplet fetch, archive download into a unique temporary file,
//! SHA-1 verification against the hash declared in `endpoint.json`,
//! then selective extraction into the package cache.
//!
//! Only the whitelisted root files (`elm.json`, `docs.json`, `LICENSE`,
//! `README.md`) and the `src/` subtree are extracted; the archive's single
//! leading directory component is stripped. The temporary archive is always
//! unlinked, whatever the outcome.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::{CacheError, PackageCache, METADATA_FILES};
use crate::pkg_version::PkgVersion;
use crate::transport::{Transport, TransportError};

/// The url and SHA-1 hash of a package archive, as declared
/// by the `endpoint.json` metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    /// Archive url.
    pub url: String,
    /// Expected SHA-1 of the archive, 40 lowercase hex digits.
    pub hash: String,
}

/// Error type for the fetch pipeline.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network needed but offline mode is active.
    #[error("offline mode active while fetching {pkg_version}")]
    Offline {
        /// The package version being fetched.
        pkg_version: PkgVersion,
    },

    /// A network request failed.
    #[error("network failure while fetching {pkg_version}")]
    Network {
        /// The package version being fetched.
        pkg_version: PkgVersion,
        /// The underlying transport error.
        #[source]
        source: TransportError,
    },

    /// The `endpoint.json` file has an unexpected shape.
    #[error("invalid endpoint.json for {pkg_version}: {reason}")]
    BadEndpoint {
        /// The package version being fetched.
        pkg_version: PkgVersion,
        /// What was wrong with it.
        reason: String,
    },

    /// The downloaded archive does not hash to the declared SHA-1.
    #[error("hash mismatch for {pkg_version}: endpoint declares {expected}, archive is {computed}")]
    HashMismatch {
        /// The package version being fetched.
        pkg_version: PkgVersion,
        /// Hash declared in `endpoint.json`.
        expected: String,
        /// Hash computed over the downloaded bytes.
        computed: String,
    },

    /// Reading entries out of the archive failed.
    #[error("failed to extract archive of {pkg_version}")]
    Extract {
        /// The package version being fetched.
        pkg_version: PkgVersion,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// A filesystem operation failed.
    #[error("filesystem error on {path}")]
    FileSystem {
        /// Path involved in the failing operation.
        path: String,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Where package archives are downloaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveSource {
    /// The url declared in `endpoint.json`, usually a forge zipball.
    #[default]
    Endpoint,
    /// The registry's own mirror layout, `<registry>/archives/<hash>.zip`.
    Registry,
}

/// The fetch pipeline: downloads package versions into the cache
/// from a registry-shaped remote.
pub struct Downloader<'a, T: Transport> {
    transport: &'a T,
    cache: &'a PackageCache,
    registry_url: String,
    ignore_hash: bool,
    archive_source: ArchiveSource,
}

/// A downloaded archive sitting in a unique temporary file,
/// unlinked when the value is dropped.
pub struct TempArchive {
    path: PathBuf,
    /// SHA-1 of the archive content, 40 lowercase hex digits.
    pub hash: String,
}

impl TempArchive {
    /// Path of the temporary archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl<'a, T: Transport> Downloader<'a, T> {
    /// Create a downloader fetching from the given registry base url.
    pub fn new<S: ToString>(transport: &'a T, cache: &'a PackageCache, registry_url: S) -> Self {
        Self {
            transport,
            cache,
            registry_url: registry_url.to_string(),
            ignore_hash: false,
            archive_source: ArchiveSource::default(),
        }
    }

    /// Choose where archives are downloaded from.
    pub fn archive_source(mut self, source: ArchiveSource) -> Self {
        self.archive_source = source;
        self
    }

    /// Skip the SHA-1 verification step. Only for registries
    /// that are known not to publish accurate hashes.
    pub fn ignore_hash(mut self, ignore: bool) -> Self {
        self.ignore_hash = ignore;
        self
    }

    /// The cache this downloader writes into.
    pub fn cache(&self) -> &PackageCache {
        self.cache
    }

    /// Run the whole pipeline with bounded retries and exponential
    /// backoff. Offline and hash-mismatch failures are never retried;
    /// any partially written package directory is removed before a new
    /// attempt.
    pub fn fetch_with_retries(
        &self,
        pv: &PkgVersion,
        max_retries: u32,
        initial_backoff: std::time::Duration,
    ) -> Result<(), FetchError> {
        let mut backoff = initial_backoff;
        let mut attempt = 1;
        loop {
            match self.fetch(pv) {
                Ok(()) => return Ok(()),
                Err(err @ (FetchError::Offline { .. } | FetchError::HashMismatch { .. })) => {
                    return Err(err)
                }
                Err(err) if attempt >= max_retries => return Err(err),
                Err(err) => {
                    log::warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt,
                        max_retries,
                        pv,
                        err
                    );
                    self.cache.remove(pv)?;
                    std::thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
            }
        }
    }

    /// Run the whole pipeline for one package version.
    ///
    /// Short-circuits when the package is already fully downloaded.
    pub fn fetch(&self, pv: &PkgVersion) -> Result<(), FetchError> {
        if self.cache.fully_downloaded(pv) {
            log::debug!("{} already fully downloaded", pv);
            return Ok(());
        }
        self.ensure_metadata(pv)?;
        let endpoint = self.read_endpoint(pv)?;
        let archive = self.download_verified_archive(pv, &endpoint)?;
        self.extract_archive(pv, archive.path())?;
        log::info!("fetched {}", pv);
        Ok(())
    }

    /// Ensure the metadata triplet is on disk, fetching any missing file.
    ///
    /// All three metadata files land before the archive is requested.
    pub fn ensure_metadata(&self, pv: &PkgVersion) -> Result<(), FetchError> {
        for file in METADATA_FILES {
            let path = self.cache.metadata_path(pv, file);
            if path.is_file() {
                continue;
            }
            let url = format!(
                "{}/packages/{}/{}/{}/{}",
                self.registry_url, pv.author_pkg.author, pv.author_pkg.pkg, pv.version, file
            );
            log::debug!("fetching {}", url);
            let content = self
                .transport
                .fetch_string(&url)
                .map_err(|e| transport_err(pv, e))?;
            self.cache.write_file_staged(&path, content.as_bytes())?;
        }
        Ok(())
    }

    /// Parse the on-disk `endpoint.json` of a package version.
    pub fn read_endpoint(&self, pv: &PkgVersion) -> Result<Endpoint, FetchError> {
        let path = self.cache.metadata_path(pv, "endpoint.json");
        let content = std::fs::read_to_string(&path).map_err(|source| FetchError::FileSystem {
            path: path.display().to_string(),
            source,
        })?;
        parse_endpoint(pv, &content)
    }

    /// Download the archive into a unique temporary file under `ELM_HOME`
    /// and verify its SHA-1 against the endpoint declaration.
    ///
    /// On mismatch the temporary file is deleted and the fetch is fatal.
    pub fn download_verified_archive(
        &self,
        pv: &PkgVersion,
        endpoint: &Endpoint,
    ) -> Result<TempArchive, FetchError> {
        let url = match self.archive_source {
            ArchiveSource::Endpoint => endpoint.url.clone(),
            ArchiveSource::Registry => {
                format!("{}/archives/{}.zip", self.registry_url, endpoint.hash)
            }
        };
        let bytes = self
            .transport
            .fetch_bytes(&url)
            .map_err(|e| transport_err(pv, e))?;
        let path = self.unique_temp_path()?;
        std::fs::write(&path, &bytes).map_err(|source| FetchError::FileSystem {
            path: path.display().to_string(),
            source,
        })?;
        let archive = TempArchive {
            hash: sha1_of_file(&path)?,
            path,
        };
        if !self.ignore_hash && archive.hash != endpoint.hash {
            return Err(FetchError::HashMismatch {
                pkg_version: pv.clone(),
                expected: endpoint.hash.clone(),
                computed: archive.hash.clone(),
            });
        }
        Ok(archive)
    }

    /// Selectively extract a verified archive into the package directory.
    ///
    /// Sources are staged under a sibling of `src/` and renamed in last,
    /// so `fully_downloaded` flips atomically.
    pub fn extract_archive(&self, pv: &PkgVersion, archive_path: &Path) -> Result<(), FetchError> {
        let pkg_dir = self.cache.package_dir(pv);
        let src_final = self.cache.src_dir(pv);
        let src_staged = pkg_dir.join("src.new");
        let result = self.extract_entries(pv, archive_path, &pkg_dir, &src_staged);
        if result.is_err() {
            let _ = std::fs::remove_dir_all(&src_staged);
            return result;
        }
        if src_staged.is_dir() {
            if src_final.exists() {
                std::fs::remove_dir_all(&src_final).map_err(|source| FetchError::FileSystem {
                    path: src_final.display().to_string(),
                    source,
                })?;
            }
            std::fs::rename(&src_staged, &src_final).map_err(|source| FetchError::FileSystem {
                path: src_final.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    fn extract_entries(
        &self,
        pv: &PkgVersion,
        archive_path: &Path,
        pkg_dir: &Path,
        src_staged: &Path,
    ) -> Result<(), FetchError> {
        let zip_err = |source| FetchError::Extract {
            pkg_version: pv.clone(),
            source,
        };
        let file = std::fs::File::open(archive_path).map_err(|source| FetchError::FileSystem {
            path: archive_path.display().to_string(),
            source,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;
        for index in 0..archive.len() {
            let zip_err = |source| FetchError::Extract {
                pkg_version: pv.clone(),
                source,
            };
            let mut entry = archive.by_index(index).map_err(zip_err)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            // Strip the single leading `<author>-<name>-<hash>/` component.
            let stripped = match name.split_once('/') {
                Some((_, rest)) if !rest.is_empty() => rest,
                _ => continue,
            };
            if stripped.split('/').any(|part| part == ".." || part.is_empty()) {
                continue;
            }
            let dest = if let Some(in_src) = stripped.strip_prefix("src/") {
                src_staged.join(in_src)
            } else if matches!(stripped, "elm.json" | "docs.json") {
                let dest = pkg_dir.join(stripped);
                if dest.exists() {
                    // Metadata already fetched from the registry wins.
                    continue;
                }
                dest
            } else if matches!(stripped, "LICENSE" | "README.md") {
                pkg_dir.join(stripped)
            } else {
                continue;
            };
            let fs_err = |source| FetchError::FileSystem {
                path: dest.display().to_string(),
                source,
            };
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(fs_err)?;
            }
            let fs_err = |source| FetchError::FileSystem {
                path: dest.display().to_string(),
                source,
            };
            let mut out = std::fs::File::create(&dest).map_err(fs_err)?;
            let fs_err = |source| FetchError::FileSystem {
                path: dest.display().to_string(),
                source,
            };
            std::io::copy(&mut entry, &mut out).map_err(fs_err)?;
        }
        Ok(())
    }

    /// Create a unique `elm-package-XXXXXX.zip` path under `ELM_HOME`.
    fn unique_temp_path(&self) -> Result<PathBuf, FetchError> {
        let home = self.cache.elm_home();
        std::fs::create_dir_all(home).map_err(|source| FetchError::FileSystem {
            path: home.display().to_string(),
            source,
        })?;
        loop {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(6)
                .map(char::from)
                .collect();
            let candidate = home.join(format!("elm-package-{}.zip", suffix));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
    }
}

fn transport_err(pv: &PkgVersion, e: TransportError) -> FetchError {
    if e.is_offline() {
        FetchError::Offline {
            pkg_version: pv.clone(),
        }
    } else {
        FetchError::Network {
            pkg_version: pv.clone(),
            source: e,
        }
    }
}

/// Parse and validate the content of an `endpoint.json` file.
pub fn parse_endpoint(pv: &PkgVersion, content: &str) -> Result<Endpoint, FetchError> {
    let bad = |reason: String| FetchError::BadEndpoint {
        pkg_version: pv.clone(),
        reason,
    };
    let endpoint: Endpoint =
        serde_json::from_str(content).map_err(|e| bad(e.to_string()))?;
    if endpoint.hash.len() != 40
        || !endpoint
            .hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(bad(format!(
            "`{}` is not a 40 digit lowercase SHA-1",
            endpoint.hash
        )));
    }
    if endpoint.url.is_empty() {
        return Err(bad("empty archive url".to_string()));
    }
    Ok(endpoint)
}

/// Compute the SHA-1 of a file, streamed, as 40 lowercase hex digits.
pub fn sha1_of_file(path: &Path) -> Result<String, FetchError> {
    let fs_err = |source| FetchError::FileSystem {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(fs_err)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 8192];
    loop {
        let fs_err = |source| FetchError::FileSystem {
            path: path.display().to_string(),
            source,
        };
        let read = file.read(&mut buffer).map_err(fs_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStatus;
    use rustc_hash::FxHashMap;
    use std::io::Write;
    use std::str::FromStr;
    use zip::write::FileOptions;

    /// Transport serving responses from an in-memory map.
    #[derive(Default)]
    struct MemoryTransport {
        responses: FxHashMap<String, Vec<u8>>,
    }

    impl Transport for MemoryTransport {
        fn fetch_string(&self, url: &str) -> Result<String, TransportError> {
            self.fetch_bytes(url)
                .map(|bytes| String::from_utf8(bytes).unwrap())
        }

        fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options =
                FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn sha1_of(bytes: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: PackageCache,
        transport: MemoryTransport,
        pv: PkgVersion,
    }

    const REGISTRY: &str = "https://registry.test";

    fn fixture(archive: Vec<u8>, declared_hash: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path(), "0.19.1");
        let pv = PkgVersion::from_str("author/pkg@1.0.0").unwrap();
        let mut transport = MemoryTransport::default();
        let meta_base = format!("{}/packages/author/pkg/1.0.0", REGISTRY);
        let archive_url = "https://archives.test/author-pkg.zip";
        transport.responses.insert(
            format!("{}/endpoint.json", meta_base),
            format!(r#"{{"url":"{}","hash":"{}"}}"#, archive_url, declared_hash).into_bytes(),
        );
        transport.responses.insert(
            format!("{}/elm.json", meta_base),
            br#"{"name":"author/pkg"}"#.to_vec(),
        );
        transport
            .responses
            .insert(format!("{}/docs.json", meta_base), b"[]".to_vec());
        transport
            .responses
            .insert(archive_url.to_string(), archive);
        Fixture {
            _dir: dir,
            cache,
            transport,
            pv,
        }
    }

    fn standard_archive() -> Vec<u8> {
        build_archive(&[
            ("author-pkg-abc123/elm.json", "{\"from\":\"archive\"}"),
            ("author-pkg-abc123/README.md", "readme"),
            ("author-pkg-abc123/LICENSE", "license"),
            ("author-pkg-abc123/src/Main.elm", "module Main"),
            ("author-pkg-abc123/src/Nested/Deep.elm", "module Deep"),
            ("author-pkg-abc123/tests/Test.elm", "module Test"),
            ("author-pkg-abc123/Makefile", "all:"),
        ])
    }

    #[test]
    fn fetch_full_pipeline() {
        let archive = standard_archive();
        let hash = sha1_of(&archive);
        let fx = fixture(archive, &hash);
        let downloader = Downloader::new(&fx.transport, &fx.cache, REGISTRY);
        downloader.fetch(&fx.pv).unwrap();

        assert!(fx.cache.fully_downloaded(&fx.pv));
        let pkg_dir = fx.cache.package_dir(&fx.pv);
        // Whitelisted files are there.
        assert!(pkg_dir.join("README.md").is_file());
        assert!(pkg_dir.join("LICENSE").is_file());
        assert!(pkg_dir.join("src/Main.elm").is_file());
        assert!(pkg_dir.join("src/Nested/Deep.elm").is_file());
        // Non-whitelisted entries are not.
        assert!(!pkg_dir.join("tests").exists());
        assert!(!pkg_dir.join("Makefile").exists());
        // The metadata elm.json fetched from the registry is not overwritten.
        let elm_json = std::fs::read_to_string(pkg_dir.join("elm.json")).unwrap();
        assert_eq!(elm_json, r#"{"name":"author/pkg"}"#);
        // The temp archive is gone.
        let leftovers: Vec<_> = std::fs::read_dir(fx.cache.elm_home())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("elm-package-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn fetch_short_circuits_when_downloaded() {
        let archive = standard_archive();
        let hash = sha1_of(&archive);
        let fx = fixture(archive, &hash);
        let downloader = Downloader::new(&fx.transport, &fx.cache, REGISTRY);
        downloader.fetch(&fx.pv).unwrap();
        // Second fetch succeeds even with an empty transport.
        let empty = MemoryTransport::default();
        let downloader = Downloader::new(&empty, &fx.cache, REGISTRY);
        downloader.fetch(&fx.pv).unwrap();
    }

    #[test]
    fn hash_mismatch_is_fatal_and_cleans_up() {
        let archive = standard_archive();
        let fx = fixture(archive, &"0".repeat(40));
        let downloader = Downloader::new(&fx.transport, &fx.cache, REGISTRY);
        let err = downloader.fetch(&fx.pv).unwrap_err();
        assert!(matches!(err, FetchError::HashMismatch { .. }));
        // No src/ was produced, metadata may be present: BROKEN at worst.
        assert_ne!(fx.cache.status(&fx.pv), CacheStatus::Ok);
        assert!(!fx.cache.src_dir(&fx.pv).exists());
        let leftovers: Vec<_> = std::fs::read_dir(fx.cache.elm_home())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("elm-package-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn ignore_hash_skips_verification() {
        let archive = standard_archive();
        let fx = fixture(archive, &"0".repeat(40));
        let downloader = Downloader::new(&fx.transport, &fx.cache, REGISTRY).ignore_hash(true);
        downloader.fetch(&fx.pv).unwrap();
        assert!(fx.cache.fully_downloaded(&fx.pv));
    }

    #[test]
    fn offline_transport_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path(), "0.19.1");
        let pv = PkgVersion::from_str("author/pkg@1.0.0").unwrap();
        let offline = crate::transport::OfflineTransport;
        let downloader = Downloader::new(&offline, &cache, REGISTRY);
        assert!(matches!(
            downloader.fetch(&pv).unwrap_err(),
            FetchError::Offline { .. }
        ));
    }

    #[test]
    fn endpoint_parser_rejects_bad_shapes() {
        let pv = PkgVersion::from_str("author/pkg@1.0.0").unwrap();
        // Extra field.
        assert!(parse_endpoint(&pv, r#"{"url":"u","hash":"h","x":1}"#).is_err());
        // Missing field.
        assert!(parse_endpoint(&pv, r#"{"url":"u"}"#).is_err());
        // Bad hash length.
        assert!(parse_endpoint(&pv, r#"{"url":"u","hash":"abc"}"#).is_err());
        // Uppercase hash digits.
        let upper = format!(r#"{{"url":"u","hash":"{}"}}"#, "A".repeat(40));
        assert!(parse_endpoint(&pv, &upper).is_err());
        // Valid shape.
        let ok = format!(r#"{{"url":"https://x/a.zip","hash":"{}"}}"#, "0".repeat(40));
        assert!(parse_endpoint(&pv, &ok).is_ok());
    }
}
