// SPDX-License-Identifier: MPL-2.0

//! Module defining the base type identifying a unique package version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::project_config::{Pkg, PkgParseError};
use crate::version::{Version, VersionParseError};

/// Type uniquely identifying a package version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PkgVersion {
    /// The package identifier (author + package name).
    pub author_pkg: Pkg,
    /// The version.
    pub version: Version,
}

/// Detailed error type for the different kind of parsing error possible.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PkgVersionParseError {
    /// Missing `@` separator between a package and a version.
    #[error("no package@version separation found in `{0}`")]
    NoVersionSeparator(String),

    /// Version is not in the correct format Major.Minor.Patch.
    #[error("failed to parse version in `{0}`")]
    VersionParseError(#[from] VersionParseError),

    /// Failed to parse the package identifier.
    #[error("failed to parse the package")]
    PkgParseError(#[from] PkgParseError),
}

impl PkgVersion {
    /// Create a package version identifier from its components.
    pub fn new(author_pkg: Pkg, version: Version) -> Self {
        Self {
            author_pkg,
            version,
        }
    }
}

impl FromStr for PkgVersion {
    type Err = PkgVersionParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let version_sep = s
            .find('@')
            .ok_or_else(|| PkgVersionParseError::NoVersionSeparator(s.to_string()))?;
        let author_pkg = Pkg::from_str(&s[0..version_sep])?;
        let version = FromStr::from_str(&s[(version_sep + 1)..])?;
        Ok(PkgVersion {
            author_pkg,
            version,
        })
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.author_pkg, self.version)
    }
}

// TESTS #######################################################################
