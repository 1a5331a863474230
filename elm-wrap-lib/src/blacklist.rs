// SPDX-License-Identifier: MPL-2.0

//! Module parsing the blacklist file shared by the mirror builder and
//! the bulk downloader.
//!
//! One entry per line: `author/name` skips every version of a package,
//! `author/name@x.y.z` skips a single version. `#` starts a comment and
//! a double space acts as an inline separator, so fail-log output can be
//! fed back as a blacklist. Invalid lines are ignored with a warning.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use crate::pkg_version::PkgVersion;
use crate::project_config::Pkg;

/// Packages and package versions to skip during bulk operations.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    whole_packages: BTreeSet<Pkg>,
    versions: BTreeSet<PkgVersion>,
}

impl Blacklist {
    /// An empty blacklist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a blacklist file; a missing file yields an empty blacklist.
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => Err(err),
        }
    }

    /// Parse the blacklist text format.
    pub fn parse(text: &str) -> Self {
        let mut blacklist = Self::new();
        for raw_line in text.lines() {
            // Strip comments and the inline fail-log separator.
            let line = raw_line.split('#').next().unwrap_or("");
            let line = line.split("  ").next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(pv) = PkgVersion::from_str(line) {
                blacklist.versions.insert(pv);
            } else if let Ok(pkg) = Pkg::from_str(line) {
                blacklist.whole_packages.insert(pkg);
            } else {
                log::warn!("ignoring invalid blacklist line: {}", raw_line);
            }
        }
        blacklist
    }

    /// Whether the given package version must be skipped.
    pub fn contains(&self, pv: &PkgVersion) -> bool {
        self.whole_packages.contains(&pv.author_pkg) || self.versions.contains(pv)
    }

    /// Number of entries, whole packages and single versions combined.
    pub fn len(&self) -> usize {
        self.whole_packages.len() + self.versions.len()
    }

    /// Whether the blacklist has no entry at all.
    pub fn is_empty(&self) -> bool {
        self.whole_packages.is_empty() && self.versions.is_empty()
    }
}

/// Append one failure line to a fail-log, in blacklist-compatible
/// format: the entry, two spaces, then the reason.
pub fn append_fail_log<P: AsRef<Path>>(
    path: P,
    pv: &PkgVersion,
    reason: &str,
) -> std::io::Result<()> {
    use std::io::Write;
    let mut line = String::new();
    let _ = write!(line, "{}  {}", pv, reason.replace('\n', " "));
    line.push('\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    file.write_all(line.as_bytes())
}

// TESTS #######################################################################
