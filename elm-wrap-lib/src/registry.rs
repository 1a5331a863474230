// SPDX-License-Identifier: MPL-2.0

//! Module loading and querying the package registry index.
//!
//! The registry maps every known package to its ordered version list and,
//! when the index carries them, to per-version dependency constraints.
//! Three index encodings are understood:
//!
//! - the binary index (`registry.dat`): length-prefixed author and name
//!   strings followed by a packed version list;
//! - the protocol-v2 text index: a `2` header line, then one
//!   `author/name@version` line per known version with optional
//!   tab-separated dependency constraints;
//! - the all-packages JSON object (`{"author/name": ["1.0.0", ...]}`),
//!   as served by the package website.
//!
//! All three loaders validate that version lists are sorted ascending
//! and free of duplicates.

use std::collections::BTreeMap as Map;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::constraint::{Constraint, ConstraintParseError};
use crate::pkg_version::{PkgVersion, PkgVersionParseError};
use crate::project_config::Pkg;
use crate::version::Version;

/// Sanity cap on the number of entries decoded from a binary index.
const MAX_BINARY_INDEX_ENTRIES: u32 = 1_000_000;

/// The registry: every known package with its ordered versions
/// and optional per-version dependency constraints.
///
/// Loaded once at startup and immutable during a solve.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Map<Pkg, RegistryEntry>,
}

/// Known versions of a single package.
#[derive(Debug, Clone, Default)]
pub struct RegistryEntry {
    /// Versions sorted ascending.
    versions: Vec<Version>,
    /// Dependency constraints per version, when the index recorded them.
    dependencies: Map<Version, Map<Pkg, Constraint>>,
}

/// Error type for loading or querying the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Reading or writing the index file failed.
    #[error("unable to read/write registry index {path}")]
    FileIo {
        /// Path of the index file.
        path: String,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// The binary index is truncated or malformed.
    #[error("corrupt registry index: {0}")]
    Corrupt(String),

    /// A version list is not sorted ascending or contains duplicates.
    #[error("registry index versions of {pkg} are not strictly ascending")]
    UnorderedVersions {
        /// Package whose version list is invalid.
        pkg: Pkg,
    },

    /// The text index announces a protocol other than 2.
    #[error("unsupported registry protocol `{0}`")]
    UnsupportedProtocol(String),

    /// A line of the text index could not be parsed.
    #[error("invalid registry line `{line}`")]
    InvalidLine {
        /// The offending line.
        line: String,
        /// The underlying parse error.
        #[source]
        source: PkgVersionParseError,
    },

    /// A dependency constraint in the text index could not be parsed.
    #[error("invalid constraint in registry line `{line}`")]
    InvalidConstraint {
        /// The offending line.
        line: String,
        /// The underlying parse error.
        #[source]
        source: ConstraintParseError,
    },

    /// The all-packages JSON could not be decoded.
    #[error("failed to decode all-packages index")]
    Json(#[from] serde_json::Error),

    /// A requested package is absent from the registry.
    #[error("package {0} is not in the registry")]
    UnknownPackage(Pkg),

    /// No known version of the package satisfies the constraint.
    #[error("no version of {pkg} satisfies {constraint}")]
    NoMatchingVersion {
        /// Package being resolved.
        pkg: Pkg,
        /// The constraint no version satisfies.
        constraint: Constraint,
    },
}

impl RegistryEntry {
    /// Known versions, newest first.
    ///
    /// This is the consumer convention: both the provider and the constraint
    /// resolver prefer the newest compatible version.
    pub fn versions_newest_first(&self) -> impl Iterator<Item = Version> + '_ {
        self.versions.iter().rev().copied()
    }

    /// Known versions, oldest first, as stored.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Highest known version of the package, if any.
    pub fn newest(&self) -> Option<Version> {
        self.versions.last().copied()
    }

    /// Dependency constraints recorded by the index for a given version.
    ///
    /// `None` when the index did not carry them (binary and all-packages
    /// encodings); callers then fall back to the cached `elm.json`.
    pub fn dependencies(&self, version: Version) -> Option<&Map<Pkg, Constraint>> {
        self.dependencies.get(&version)
    }

    fn validate(&self, pkg: &Pkg) -> Result<(), RegistryError> {
        let ascending = self.versions.windows(2).all(|w| w[0] < w[1]);
        if ascending {
            Ok(())
        } else {
            Err(RegistryError::UnorderedVersions { pkg: pkg.clone() })
        }
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry index from disk, sniffing the encoding.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RegistryError::FileIo {
            path: path.display().to_string(),
            source,
        })?;
        match bytes.first() {
            Some(b'{') => Self::from_all_packages_json(&bytes),
            Some(b'2') => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| RegistryError::Corrupt("text index is not UTF-8".to_string()))?;
                Self::from_text_index(&text)
            }
            _ => Self::from_binary_index(&bytes),
        }
    }

    /// Decode the all-packages JSON object.
    pub fn from_all_packages_json(bytes: &[u8]) -> Result<Self, RegistryError> {
        let raw: Map<Pkg, Vec<Version>> = serde_json::from_slice(bytes)?;
        let mut registry = Registry::new();
        for (pkg, versions) in raw {
            let entry = RegistryEntry {
                versions,
                dependencies: Map::new(),
            };
            entry.validate(&pkg)?;
            registry.entries.insert(pkg, entry);
        }
        Ok(registry)
    }

    /// Decode the protocol-v2 text index.
    pub fn from_text_index(text: &str) -> Result<Self, RegistryError> {
        let mut lines = text.lines();
        match lines.next().map(str::trim) {
            Some("2") => {}
            Some(other) => return Err(RegistryError::UnsupportedProtocol(other.to_string())),
            None => return Err(RegistryError::Corrupt("empty text index".to_string())),
        }
        let mut registry = Registry::new();
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (pv_str, deps_str) = match line.split_once('\t') {
                Some((pv, deps)) => (pv, Some(deps)),
                None => (line, None),
            };
            let pv = PkgVersion::from_str(pv_str).map_err(|source| RegistryError::InvalidLine {
                line: line.to_string(),
                source,
            })?;
            let mut deps = Map::new();
            if let Some(deps_str) = deps_str {
                for dep in deps_str.split(';').filter(|d| !d.is_empty()) {
                    let (dep_pkg, dep_constraint) =
                        dep.split_once(':')
                            .ok_or_else(|| RegistryError::Corrupt(format!(
                                "missing `:` in dependency `{}`",
                                dep
                            )))?;
                    let dep_pkg = Pkg::from_str(dep_pkg.trim()).map_err(|source| {
                        RegistryError::InvalidLine {
                            line: line.to_string(),
                            source: source.into(),
                        }
                    })?;
                    let constraint =
                        Constraint::from_str(dep_constraint.trim()).map_err(|source| {
                            RegistryError::InvalidConstraint {
                                line: line.to_string(),
                                source,
                            }
                        })?;
                    deps.insert(dep_pkg, constraint);
                }
            }
            registry.add_version_with_deps(&pv.author_pkg, pv.version, deps);
        }
        for (pkg, entry) in &registry.entries {
            entry.validate(pkg)?;
        }
        Ok(registry)
    }

    /// Decode the binary index.
    pub fn from_binary_index(bytes: &[u8]) -> Result<Self, RegistryError> {
        let mut reader = BinaryReader::new(bytes);
        let count = reader.u32()?;
        if count > MAX_BINARY_INDEX_ENTRIES {
            return Err(RegistryError::Corrupt(format!(
                "entry count {} above limit",
                count
            )));
        }
        let mut registry = Registry::new();
        for _ in 0..count {
            let author = reader.string()?;
            let name = reader.string()?;
            let pkg = Pkg::new(author, name);
            let version_count = reader.u16()?;
            let mut versions = Vec::with_capacity(version_count as usize);
            for _ in 0..version_count {
                versions.push(reader.packed_version()?);
            }
            let entry = RegistryEntry {
                versions,
                dependencies: Map::new(),
            };
            entry.validate(&pkg)?;
            if registry.entries.insert(pkg.clone(), entry).is_some() {
                return Err(RegistryError::Corrupt(format!("duplicate entry for {}", pkg)));
            }
        }
        if !reader.at_end() {
            return Err(RegistryError::Corrupt("trailing bytes".to_string()));
        }
        Ok(registry)
    }

    /// Encode the registry in the binary index format and write it to disk.
    ///
    /// The content is staged in a sibling file and renamed in.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for (pkg, entry) in &self.entries {
            write_string(&mut out, &pkg.author);
            write_string(&mut out, &pkg.pkg);
            out.extend_from_slice(&(entry.versions.len() as u16).to_be_bytes());
            for v in &entry.versions {
                write_packed_version(&mut out, *v);
            }
        }
        let io_err = |source| RegistryError::FileIo {
            path: path.display().to_string(),
            source,
        };
        let staged = path.with_extension("dat.new");
        std::fs::write(&staged, &out).map_err(io_err)?;
        let io_err = |source| RegistryError::FileIo {
            path: path.display().to_string(),
            source,
        };
        std::fs::rename(&staged, path).map_err(io_err)
    }

    /// Encode the registry in the protocol-v2 text format.
    pub fn to_text_index(&self) -> String {
        let mut out = String::from("2\n");
        for (pkg, entry) in &self.entries {
            for v in &entry.versions {
                let _ = write!(out, "{}@{}", pkg, v);
                if let Some(deps) = entry.dependencies.get(v) {
                    if !deps.is_empty() {
                        out.push('\t');
                        let rendered: Vec<String> = deps
                            .iter()
                            .map(|(dep, constraint)| format!("{}:{}", dep, constraint))
                            .collect();
                        out.push_str(&rendered.join(";"));
                    }
                }
                out.push('\n');
            }
        }
        out
    }

    /// Build a registry from the versions installed in a packages cache directory.
    ///
    /// Layout scanned: `<packages_root>/<author>/<name>/<version>/`.
    pub fn from_cache_dir<P: AsRef<Path>>(packages_root: P) -> Result<Self, RegistryError> {
        let mut registry = Registry::new();
        let root = packages_root.as_ref();
        for author_entry in read_dirs(root)? {
            let author = author_entry;
            for name_entry in read_dirs(&root.join(&author))? {
                let pkg = Pkg::new(&author, &name_entry);
                for version_dir in read_dirs(&root.join(&author).join(&name_entry))? {
                    if let Ok(version) = Version::from_str(&version_dir) {
                        registry.add_version(&pkg, version);
                    }
                }
            }
        }
        Ok(registry)
    }

    /// Register a known version of a package. Idempotent.
    pub fn add_version(&mut self, pkg: &Pkg, version: Version) {
        let entry = self.entries.entry(pkg.clone()).or_default();
        match entry.versions.binary_search(&version) {
            Ok(_) => {}
            Err(pos) => entry.versions.insert(pos, version),
        }
    }

    /// Register a known version together with its dependency constraints.
    fn add_version_with_deps(&mut self, pkg: &Pkg, version: Version, deps: Map<Pkg, Constraint>) {
        self.add_version(pkg, version);
        let entry = self.entries.entry(pkg.clone()).or_default();
        if !deps.is_empty() {
            entry.dependencies.insert(version, deps);
        }
    }

    /// Look up a package entry.
    pub fn find(&self, pkg: &Pkg) -> Option<&RegistryEntry> {
        self.entries.get(pkg)
    }

    /// Number of packages known to the registry.
    pub fn package_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of known (package, version) pairs.
    pub fn version_count(&self) -> usize {
        self.entries.values().map(|e| e.versions.len()).sum()
    }

    /// Iterate over entries in deterministic (author, name) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Pkg, &RegistryEntry)> {
        self.entries.iter()
    }

    /// Iterate over every known (package, version) pair in deterministic
    /// (author, name, version-ascending) order.
    pub fn iter_versions(&self) -> impl Iterator<Item = PkgVersion> + '_ {
        self.entries.iter().flat_map(|(pkg, entry)| {
            entry
                .versions
                .iter()
                .map(move |v| PkgVersion::new(pkg.clone(), *v))
        })
    }

    /// Resolve a constraint to the highest known version satisfying it.
    pub fn resolve_constraint(
        &self,
        pkg: &Pkg,
        constraint: &Constraint,
    ) -> Result<Version, RegistryError> {
        let entry = self
            .find(pkg)
            .ok_or_else(|| RegistryError::UnknownPackage(pkg.clone()))?;
        entry
            .versions_newest_first()
            .find(|v| constraint.0.contains(*v))
            .ok_or_else(|| RegistryError::NoMatchingVersion {
                pkg: pkg.clone(),
                constraint: constraint.clone(),
            })
    }
}

fn read_dirs(path: &Path) -> Result<Vec<String>, RegistryError> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return Ok(Vec::new()),
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names)
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.push(bytes.len().min(255) as u8);
    out.extend_from_slice(&bytes[..bytes.len().min(255)]);
}

fn write_packed_version(out: &mut Vec<u8>, v: Version) {
    if v.major < 255 && v.minor < 256 && v.patch < 256 {
        out.push(v.major as u8);
        out.push(v.minor as u8);
        out.push(v.patch as u8);
    } else {
        out.push(255);
        out.extend_from_slice(&(v.major as u16).to_be_bytes());
        out.extend_from_slice(&(v.minor as u16).to_be_bytes());
        out.extend_from_slice(&(v.patch as u16).to_be_bytes());
    }
}

struct BinaryReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RegistryError> {
        if self.pos + n > self.bytes.len() {
            return Err(RegistryError::Corrupt("unexpected end of index".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, RegistryError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, RegistryError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, RegistryError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, RegistryError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| RegistryError::Corrupt("string is not UTF-8".to_string()))
    }

    fn packed_version(&mut self) -> Result<Version, RegistryError> {
        let major = self.u8()?;
        if major == 255 {
            Ok(Version::new(
                self.u16()? as u32,
                self.u16()? as u32,
                self.u16()? as u32,
            ))
        } else {
            Ok(Version::new(
                major as u32,
                self.u8()? as u32,
                self.u8()? as u32,
            ))
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32, patch: u32) -> Version {
        Version::new(major, minor, patch)
    }

    fn sample_registry() -> Registry {
        let mut registry = Registry::new();
        let core = Pkg::new("elm", "core");
        registry.add_version(&core, v(1, 0, 0));
        registry.add_version(&core, v(1, 0, 5));
        registry.add_version(&Pkg::new("elm", "html"), v(1, 0, 0));
        registry
    }

    #[test]
    fn binary_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.dat");
        let registry = sample_registry();
        registry.save(&path).unwrap();
        let reloaded = Registry::load(&path).unwrap();
        assert_eq!(reloaded.package_count(), 2);
        assert_eq!(reloaded.version_count(), 3);
        let core = reloaded.find(&Pkg::new("elm", "core")).unwrap();
        assert_eq!(core.newest(), Some(v(1, 0, 5)));
    }

    #[test]
    fn binary_escape_for_large_components() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.dat");
        let mut registry = Registry::new();
        let pkg = Pkg::new("author", "big");
        registry.add_version(&pkg, v(300, 2, 1));
        registry.save(&path).unwrap();
        let reloaded = Registry::load(&path).unwrap();
        assert_eq!(reloaded.find(&pkg).unwrap().newest(), Some(v(300, 2, 1)));
    }

    #[test]
    fn text_index_roundtrip_with_deps() {
        let text = "2\n\
                    elm/core@1.0.0\n\
                    elm/html@1.0.0\telm/core:1.0.0 <= v < 2.0.0\n";
        let registry = Registry::from_text_index(text).unwrap();
        let html = registry.find(&Pkg::new("elm", "html")).unwrap();
        let deps = html.dependencies(v(1, 0, 0)).unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps.contains_key(&Pkg::new("elm", "core")));
        let rendered = registry.to_text_index();
        let reparsed = Registry::from_text_index(&rendered).unwrap();
        assert_eq!(reparsed.version_count(), registry.version_count());
    }

    #[test]
    fn text_index_rejects_unknown_protocol() {
        assert!(matches!(
            Registry::from_text_index("3\nelm/core@1.0.0\n"),
            Err(RegistryError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn all_packages_json() {
        let json = br#"{ "elm/core": ["1.0.0", "1.0.5"], "elm/html": ["1.0.0"] }"#;
        let registry = Registry::from_all_packages_json(json).unwrap();
        assert_eq!(registry.version_count(), 3);
    }

    #[test]
    fn all_packages_json_rejects_unordered() {
        let json = br#"{ "elm/core": ["1.0.5", "1.0.0"] }"#;
        assert!(matches!(
            Registry::from_all_packages_json(json),
            Err(RegistryError::UnorderedVersions { .. })
        ));
    }

    #[test]
    fn resolve_constraint_prefers_newest() {
        let registry = sample_registry();
        let core = Pkg::new("elm", "core");
        let constraint: Constraint = "1.0.0 <= v < 2.0.0".parse().unwrap();
        assert_eq!(
            registry.resolve_constraint(&core, &constraint).unwrap(),
            v(1, 0, 5)
        );
    }

    #[test]
    fn resolve_constraint_failures() {
        let registry = sample_registry();
        let constraint: Constraint = "2.0.0 <= v < 3.0.0".parse().unwrap();
        assert!(matches!(
            registry.resolve_constraint(&Pkg::new("elm", "core"), &constraint),
            Err(RegistryError::NoMatchingVersion { .. })
        ));
        assert!(matches!(
            registry.resolve_constraint(&Pkg::new("no", "body"), &constraint),
            Err(RegistryError::UnknownPackage(_))
        ));
    }

    #[test]
    fn iter_versions_is_deterministic() {
        let registry = sample_registry();
        let listed: Vec<String> = registry.iter_versions().map(|pv| pv.to_string()).collect();
        assert_eq!(
            listed,
            vec!["elm/core@1.0.0", "elm/core@1.0.5", "elm/html@1.0.0"]
        );
    }

    #[test]
    fn from_cache_dir_scans_layout() {
        let dir = tempfile::tempdir().unwrap();
        for sub in [
            "elm/core/1.0.0",
            "elm/core/1.0.5",
            "elm/html/1.0.0",
            "elm/html/not-a-version",
        ] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let registry = Registry::from_cache_dir(dir.path()).unwrap();
        assert_eq!(registry.version_count(), 3);
    }
}
