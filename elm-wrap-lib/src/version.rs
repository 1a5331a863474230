// SPDX-License-Identifier: MPL-2.0

//! Module defining semantic versions and bounded version ranges.
//!
//! Versions are triples of non-negative integers ordered lexicographically.
//! Ranges are contiguous intervals delimited by two optional bounds,
//! each inclusive or exclusive, with an explicit empty range.
//! These are the building blocks manipulated by the constraint parser,
//! the registry and the dependency solver.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A semantic version, as used by the elm package ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

/// Error creating a [Version] from a string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionParseError {
    /// A version must be composed of exactly three dot-separated components.
    #[error("version `{0}` must have the shape Major.Minor.Patch")]
    NotThreeParts(String),

    /// Each component must be a non-negative integer.
    #[error("invalid number in version `{full_version}`")]
    InvalidNumber {
        /// Version that was being parsed.
        full_version: String,
        /// The underlying integer parsing error.
        #[source]
        source: std::num::ParseIntError,
    },
}

impl Version {
    /// Create a version from its three components.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version 0.0.0, used for the synthetic root package.
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Version 1.0.0, the lowest version publishable on the package server.
    pub fn one() -> Self {
        Self::new(1, 0, 0)
    }

    /// The smallest version strictly greater than this one.
    pub fn bump_patch(self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// The start of the next minor series.
    pub fn bump_minor(self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// The start of the next major series.
    pub fn bump_major(self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split('.').collect();
        match *parts.as_slice() {
            [major, minor, patch] => {
                let parse = |p: &str| {
                    p.parse::<u32>()
                        .map_err(|source| VersionParseError::InvalidNumber {
                            full_version: s.to_string(),
                            source,
                        })
                };
                Ok(Version::new(parse(major)?, parse(minor)?, parse(patch)?))
            }
            _ => Err(VersionParseError::NotThreeParts(s.to_string())),
        }
    }
}

impl From<(u32, u32, u32)> for Version {
    fn from((major, minor, patch): (u32, u32, u32)) -> Self {
        Self::new(major, minor, patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One end of a version range, either absent or a version
/// included or excluded from the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    /// The range extends without limit on this side.
    Unbounded,
    /// The range includes this version.
    Inclusive(Version),
    /// The range stops just before (or just after) this version.
    Exclusive(Version),
}

/// A contiguous interval of versions.
///
/// The empty range is an explicit state reached whenever the two bounds
/// cannot both be satisfied. It is absorbing for [intersection](Range::intersection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    lower: Bound,
    upper: Bound,
    empty: bool,
}

impl Range {
    /// The range containing every version.
    pub fn any() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            empty: false,
        }
    }

    /// The range containing no version at all.
    pub fn none() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            empty: true,
        }
    }

    /// The range containing exactly one version.
    pub fn exact(v: Version) -> Self {
        Self {
            lower: Bound::Inclusive(v),
            upper: Bound::Inclusive(v),
            empty: false,
        }
    }

    /// All versions greater than or equal to `v`.
    pub fn higher_than(v: Version) -> Self {
        Self {
            lower: Bound::Inclusive(v),
            upper: Bound::Unbounded,
            empty: false,
        }
    }

    /// All versions strictly lower than `v`.
    pub fn strictly_lower_than(v: Version) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Exclusive(v),
            empty: false,
        }
    }

    /// The half-open interval `[low, high)`.
    pub fn between(low: Version, high: Version) -> Self {
        Self::normalize(Bound::Inclusive(low), Bound::Exclusive(high))
    }

    /// The half-open interval `[v, v.major.(v.minor+1).0)`.
    pub fn until_next_minor(v: Version) -> Self {
        Self::between(v, v.bump_minor())
    }

    /// The half-open interval `[v, (v.major+1).0.0)`.
    pub fn until_next_major(v: Version) -> Self {
        Self::between(v, v.bump_major())
    }

    /// Build a range from raw bounds, collapsing impossible intervals to empty.
    pub fn from_bounds(lower: Bound, upper: Bound) -> Self {
        Self::normalize(lower, upper)
    }

    fn normalize(lower: Bound, upper: Bound) -> Self {
        let empty = match (bound_version(lower), bound_version(upper)) {
            (Some(lo), Some(hi)) => match lo.cmp(&hi) {
                Ordering::Greater => true,
                Ordering::Equal => {
                    !(matches!(lower, Bound::Inclusive(_)) && matches!(upper, Bound::Inclusive(_)))
                }
                Ordering::Less => false,
            },
            _ => false,
        };
        if empty {
            Self::none()
        } else {
            Self {
                lower,
                upper,
                empty: false,
            }
        }
    }

    /// Lower bound of the range. Meaningless if the range is empty.
    pub fn lower(&self) -> Bound {
        self.lower
    }

    /// Upper bound of the range. Meaningless if the range is empty.
    pub fn upper(&self) -> Bound {
        self.upper
    }

    /// Check whether the range contains no version.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Check whether the range contains the given version.
    pub fn contains(&self, v: Version) -> bool {
        if self.empty {
            return false;
        }
        let above_lower = match self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(lo) => v >= lo,
            Bound::Exclusive(lo) => v > lo,
        };
        let below_upper = match self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(hi) => v <= hi,
            Bound::Exclusive(hi) => v < hi,
        };
        above_lower && below_upper
    }

    /// Compute the intersection of two ranges.
    ///
    /// Commutative and associative; the empty range is absorbing
    /// and the full range is neutral.
    pub fn intersection(&self, other: &Range) -> Range {
        if self.empty || other.empty {
            return Range::none();
        }
        let lower = tighter_lower(self.lower, other.lower);
        let upper = tighter_upper(self.upper, other.upper);
        Self::normalize(lower, upper)
    }

    /// Check whether the two ranges share no version.
    pub fn is_disjoint(&self, other: &Range) -> bool {
        self.intersection(other).is_empty()
    }

    /// Check whether every version of `self` also belongs to `other`.
    pub fn is_subset_of(&self, other: &Range) -> bool {
        if self.empty {
            return true;
        }
        if other.empty {
            return false;
        }
        // Contained iff the other range is bounded no tighter on either side.
        !lower_is_tighter(other.lower, self.lower) && !upper_is_tighter(other.upper, self.upper)
    }

    /// If the range contains exactly one version, return it.
    pub fn as_exact(&self) -> Option<Version> {
        match (self.empty, self.lower, self.upper) {
            (false, Bound::Inclusive(lo), Bound::Inclusive(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }
}

fn bound_version(b: Bound) -> Option<Version> {
    match b {
        Bound::Unbounded => None,
        Bound::Inclusive(v) | Bound::Exclusive(v) => Some(v),
    }
}

/// True when `a` excludes versions that `b` would admit, on the lower side.
fn lower_is_tighter(a: Bound, b: Bound) -> bool {
    match (a, b) {
        (Bound::Unbounded, _) => false,
        (_, Bound::Unbounded) => true,
        (Bound::Inclusive(va), Bound::Inclusive(vb)) => va > vb,
        (Bound::Exclusive(va), Bound::Exclusive(vb)) => va > vb,
        (Bound::Inclusive(va), Bound::Exclusive(vb)) => va > vb,
        (Bound::Exclusive(va), Bound::Inclusive(vb)) => va >= vb,
    }
}

/// True when `a` excludes versions that `b` would admit, on the upper side.
fn upper_is_tighter(a: Bound, b: Bound) -> bool {
    match (a, b) {
        (Bound::Unbounded, _) => false,
        (_, Bound::Unbounded) => true,
        (Bound::Inclusive(va), Bound::Inclusive(vb)) => va < vb,
        (Bound::Exclusive(va), Bound::Exclusive(vb)) => va < vb,
        (Bound::Exclusive(va), Bound::Inclusive(vb)) => va <= vb,
        (Bound::Inclusive(va), Bound::Exclusive(vb)) => va < vb,
    }
}

fn tighter_lower(a: Bound, b: Bound) -> Bound {
    if lower_is_tighter(a, b) {
        a
    } else {
        b
    }
}

fn tighter_upper(a: Bound, b: Bound) -> Bound {
    if upper_is_tighter(a, b) {
        a
    } else {
        b
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            return write!(f, "no version");
        }
        if let Some(v) = self.as_exact() {
            return write!(f, "{}", v);
        }
        match (self.lower, self.upper) {
            (Bound::Unbounded, Bound::Unbounded) => write!(f, "any version"),
            (Bound::Inclusive(lo), Bound::Exclusive(hi)) => {
                write!(f, "{} <= v < {}", lo, hi)
            }
            (Bound::Inclusive(lo), Bound::Inclusive(hi)) => {
                write!(f, "{} <= v <= {}", lo, hi)
            }
            (Bound::Exclusive(lo), Bound::Exclusive(hi)) => {
                write!(f, "{} < v < {}", lo, hi)
            }
            (Bound::Exclusive(lo), Bound::Inclusive(hi)) => {
                write!(f, "{} < v <= {}", lo, hi)
            }
            (Bound::Unbounded, Bound::Exclusive(hi)) => write!(f, "v < {}", hi),
            (Bound::Unbounded, Bound::Inclusive(hi)) => write!(f, "v <= {}", hi),
            (Bound::Inclusive(lo), Bound::Unbounded) => write!(f, "v >= {}", lo),
            (Bound::Exclusive(lo), Bound::Unbounded) => write!(f, "v > {}", lo),
        }
    }
}

// TESTS #######################################################################
