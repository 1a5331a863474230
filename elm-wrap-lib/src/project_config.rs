// SPDX-License-Identifier: MPL-2.0

//! Module dealing with project configuration related to the `elm.json` file.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap as Map;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::constraint::Constraint;
use crate::version::Version;

/// Hard cap on the size of an `elm.json` file read from disk.
pub const MAX_ELM_JSON_FILE_BYTES: u64 = 1024 * 1024;

/// Hard cap on the number of entries in any single dependency map.
pub const MAX_ELM_JSON_DEPENDENCY_ENTRIES: usize = 4096;

/// Project configuration corresponding to an `elm.json` file.
/// It either is a package or an application.
/// Both have different sets of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProjectConfig {
    /// Application variant of a project config.
    Application(ApplicationConfig),
    /// Package variant of a project config.
    Package(PackageConfig),
}

/// Struct representing the `elm.json` of an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationConfig {
    /// Source directories.
    pub source_directories: Vec<String>,
    /// Elm version.
    pub elm_version: Version,
    /// Dependencies of the application.
    pub dependencies: AppDependencies,
    /// Test dependencies of the application.
    pub test_dependencies: AppDependencies,
}

/// Dependencies of an elm application, pinned to exact versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDependencies {
    /// Direct dependencies.
    pub direct: Map<Pkg, Version>,
    /// Indirect dependencies.
    pub indirect: Map<Pkg, Version>,
}

/// Struct representing the `elm.json` of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageConfig {
    /// Package identifier (author + package name).
    pub name: Pkg,
    /// Summary explanation of the package.
    pub summary: String,
    /// License of the package.
    pub license: String,
    /// Version of the package.
    pub version: Version,
    /// Version of elm that is compatible with this package.
    pub elm_version: Constraint,
    /// Exposed modules of the package.
    pub exposed_modules: ExposedModules,
    /// Dependencies of the package.
    pub dependencies: Map<Pkg, Constraint>,
    /// Test dependencies of the package.
    pub test_dependencies: Map<Pkg, Constraint>,
}

/// A package identifier, composed of the author name and the package name.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Pkg {
    /// Author of the package.
    pub author: String,
    /// Package name.
    pub pkg: String,
}

/// Error type for parsing errors of package identifiers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PkgParseError {
    /// Error corresponding to a missing separator between the author and package name.
    #[error("no author/package separation found in `{0}`")]
    NoAuthorSeparator(String),
}

/// Error type for reading or writing a project config file.
#[derive(Error, Debug)]
pub enum ProjectConfigError {
    /// Reading or writing the file failed.
    #[error("unable to read/write {path}")]
    FileIo {
        /// Path of the config file.
        path: String,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// The file is bigger than [MAX_ELM_JSON_FILE_BYTES].
    #[error("{path} is {size} bytes, above the {limit} bytes limit")]
    FileTooBig {
        /// Path of the config file.
        path: String,
        /// Actual file size.
        size: u64,
        /// The enforced limit.
        limit: u64,
    },

    /// A dependency map has more than [MAX_ELM_JSON_DEPENDENCY_ENTRIES] entries.
    #[error("{path} holds {count} dependency entries, above the {limit} limit")]
    TooManyDependencies {
        /// Path of the config file.
        path: String,
        /// Actual number of entries.
        count: usize,
        /// The enforced limit.
        limit: usize,
    },

    /// The JSON could not be decoded into a project config.
    #[error("failed to decode {path}")]
    Json {
        /// Path of the config file.
        path: String,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Exposed modules, potentially regrouped by categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExposedModules {
    /// All modules are exposed at the same hierarchy.
    NoCategory(Vec<String>),
    /// Exposed modules are grouped by categories.
    WithCategories(Map<String, Vec<String>>),
}

impl ProjectConfig {
    /// Load and validate a project config from an `elm.json` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProjectConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let io_err = |source| ProjectConfigError::FileIo {
            path: display.clone(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > MAX_ELM_JSON_FILE_BYTES {
            return Err(ProjectConfigError::FileTooBig {
                path: display,
                size,
                limit: MAX_ELM_JSON_FILE_BYTES,
            });
        }
        let io_err = |source| ProjectConfigError::FileIo {
            path: display.clone(),
            source,
        };
        let config_str = std::fs::read_to_string(path).map_err(io_err)?;
        let config: ProjectConfig =
            serde_json::from_str(&config_str).map_err(|source| ProjectConfigError::Json {
                path: display.clone(),
                source,
            })?;
        let count = config.dependency_entry_count();
        if count > MAX_ELM_JSON_DEPENDENCY_ENTRIES {
            return Err(ProjectConfigError::TooManyDependencies {
                path: display,
                count,
                limit: MAX_ELM_JSON_DEPENDENCY_ENTRIES,
            });
        }
        Ok(config)
    }

    /// Write the project config back to an `elm.json` file.
    ///
    /// The content is staged in a sibling file and renamed in,
    /// so readers never observe a half-written config.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProjectConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let io_err = |source| ProjectConfigError::FileIo {
            path: display.clone(),
            source,
        };
        let content = serde_json::to_string_pretty(self).map_err(|source| {
            ProjectConfigError::Json {
                path: display.clone(),
                source,
            }
        })?;
        let staged = path.with_extension("json.new");
        std::fs::write(&staged, content.as_bytes()).map_err(io_err)?;
        let io_err = |source| ProjectConfigError::FileIo {
            path: display.clone(),
            source,
        };
        std::fs::rename(&staged, path).map_err(io_err)
    }

    fn dependency_entry_count(&self) -> usize {
        match self {
            ProjectConfig::Application(app) => {
                app.dependencies.direct.len()
                    + app.dependencies.indirect.len()
                    + app.test_dependencies.direct.len()
                    + app.test_dependencies.indirect.len()
            }
            ProjectConfig::Package(pkg) => {
                pkg.dependencies.len() + pkg.test_dependencies.len()
            }
        }
    }
}

impl ApplicationConfig {
    /// Current locked version of a package, looked up in the four dependency maps.
    pub fn locked_version_of(&self, pkg: &Pkg) -> Option<Version> {
        self.dependencies
            .direct
            .get(pkg)
            .or_else(|| self.dependencies.indirect.get(pkg))
            .or_else(|| self.test_dependencies.direct.get(pkg))
            .or_else(|| self.test_dependencies.indirect.get(pkg))
            .copied()
    }

    /// Iterate over all four dependency maps, direct first.
    pub fn all_dependencies(&self) -> impl Iterator<Item = (&Pkg, &Version)> {
        self.dependencies
            .direct
            .iter()
            .chain(self.dependencies.indirect.iter())
            .chain(self.test_dependencies.direct.iter())
            .chain(self.test_dependencies.indirect.iter())
    }

    /// Check whether a package appears in one of the two direct maps.
    pub fn is_direct(&self, pkg: &Pkg) -> bool {
        self.dependencies.direct.contains_key(pkg)
            || self.test_dependencies.direct.contains_key(pkg)
    }
}

// Public Pkg methods.
impl Pkg {
    /// Create a new package identifier from its two components, author and package name.
    pub fn new<S1: ToString, S2: ToString>(author: S1, pkg: S2) -> Self {
        Self {
            author: author.to_string(),
            pkg: pkg.to_string(),
        }
    }

    /// Get the url corresponding to this package on the package server.
    ///
    /// This looks like `https://remote/packages/author/package`.
    pub fn to_url(&self, remote_base_url: &str) -> String {
        format!("{}/packages/{}/{}", remote_base_url, self.author, self.pkg)
    }
}

impl FromStr for Pkg {
    type Err = PkgParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let author_sep = s
            .find('/')
            .ok_or_else(|| PkgParseError::NoAuthorSeparator(s.to_string()))?;
        let author = s[0..author_sep].to_string();
        let pkg = s[(author_sep + 1)..].to_string();
        Ok(Pkg { author, pkg })
    }
}

impl fmt::Display for Pkg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", &self.author, &self.pkg)
    }
}

// Custom serialization for Pkg
impl Serialize for Pkg {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pkg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    const APP_JSON: &str = r#"{
        "type": "application",
        "source-directories": ["src"],
        "elm-version": "0.19.1",
        "dependencies": {
            "direct": { "elm/core": "1.0.5" },
            "indirect": { "elm/json": "1.1.3" }
        },
        "test-dependencies": {
            "direct": {},
            "indirect": {}
        }
    }"#;

    const PKG_JSON: &str = r#"{
        "type": "package",
        "name": "author/library",
        "summary": "helpers",
        "license": "BSD-3-Clause",
        "version": "2.1.0",
        "elm-version": "0.19.0 <= v < 0.20.0",
        "exposed-modules": ["Library"],
        "dependencies": {
            "elm/core": "1.0.0 <= v < 2.0.0"
        },
        "test-dependencies": {}
    }"#;

    #[test]
    fn decode_application() {
        let config: ProjectConfig = serde_json::from_str(APP_JSON).unwrap();
        match config {
            ProjectConfig::Application(app) => {
                assert_eq!(app.elm_version, Version::new(0, 19, 1));
                let core = Pkg::new("elm", "core");
                assert_eq!(app.locked_version_of(&core), Some(Version::new(1, 0, 5)));
                assert!(app.is_direct(&core));
                assert!(!app.is_direct(&Pkg::new("elm", "json")));
            }
            ProjectConfig::Package(_) => panic!("expected an application config"),
        }
    }

    #[test]
    fn decode_package() {
        let config: ProjectConfig = serde_json::from_str(PKG_JSON).unwrap();
        match config {
            ProjectConfig::Package(pkg) => {
                assert_eq!(pkg.name, Pkg::new("author", "library"));
                assert_eq!(pkg.version, Version::new(2, 1, 0));
                assert_eq!(pkg.dependencies.len(), 1);
            }
            ProjectConfig::Application(_) => panic!("expected a package config"),
        }
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elm.json");
        let config: ProjectConfig = serde_json::from_str(APP_JSON).unwrap();
        config.save(&path).unwrap();
        let reloaded = ProjectConfig::load(&path).unwrap();
        match reloaded {
            ProjectConfig::Application(app) => {
                assert_eq!(app.dependencies.direct.len(), 1);
                assert_eq!(app.dependencies.indirect.len(), 1);
            }
            ProjectConfig::Package(_) => panic!("expected an application config"),
        }
    }

    #[test]
    fn pkg_parse_and_display() {
        let pkg: Pkg = "elm/core".parse().unwrap();
        assert_eq!(pkg, Pkg::new("elm", "core"));
        assert_eq!(pkg.to_string(), "elm/core");
        assert!(Pkg::from_str("nodash").is_err());
    }
}
