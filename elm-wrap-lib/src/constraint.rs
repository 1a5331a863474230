// SPDX-License-Identifier: MPL-2.0

//! Module helping with serialization and deserialization of version constraints.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::version::{Bound, Range, Version, VersionParseError};

/// A constraint is a simple newtype for version ranges,
/// rendered in the elm constraint syntax `1.0.0 <= v < 2.0.0`.
///
/// Parsing also accepts a bare `Major.Minor.Patch`, meaning that exact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint(pub Range);

/// Error creating a [Constraint] from a string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConstraintParseError {
    /// Constraint must have the shape "v1 <= v < v2" or "v1.v2.v3".
    #[error(
        "Invalid format \"{full_constraint}\": constraint must have the shape \"v1 <= v < v2\""
    )]
    InvalidFormat {
        /// Constraint that was being parsed.
        full_constraint: String,
    },
    /// Allowed separators are "<=" and "<".
    #[error("Invalid separators \"{full_constraint}\": the only separators allowed are \"<=\" and \"<\"")]
    InvalidSeparator {
        /// Constraint that was being parsed.
        full_constraint: String,
    },
    /// Invalid version.
    #[error("Invalid version in constraint")]
    InvalidVersion(#[from] VersionParseError),
}

impl Constraint {
    /// Constraint matching exactly one version.
    pub fn exact(v: Version) -> Self {
        Constraint(Range::exact(v))
    }

    /// Constraint matching any version at all.
    pub fn any() -> Self {
        Constraint(Range::any())
    }

    /// Constraint matching `[v, (v.major+1).0.0)`.
    pub fn until_next_major(v: Version) -> Self {
        Constraint(Range::until_next_major(v))
    }
}

impl FromStr for Constraint {
    type Err = ConstraintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split_whitespace().collect();
        match *parts.as_slice() {
            [exact] => {
                let v: Version = FromStr::from_str(exact)?;
                Ok(Self(Range::exact(v)))
            }
            [low, sep1, "v", sep2, high] => {
                let v1: Version = FromStr::from_str(low)?;
                let v2: Version = FromStr::from_str(high)?;
                let lower = match sep1 {
                    "<=" => Bound::Inclusive(v1),
                    "<" => Bound::Exclusive(v1),
                    _ => {
                        return Err(Self::Err::InvalidSeparator {
                            full_constraint: s.to_string(),
                        })
                    }
                };
                let upper = match sep2 {
                    "<" => Bound::Exclusive(v2),
                    "<=" => Bound::Inclusive(v2),
                    _ => {
                        return Err(Self::Err::InvalidSeparator {
                            full_constraint: s.to_string(),
                        })
                    }
                };
                Ok(Self(Range::from_bounds(lower, upper)))
            }
            _ => Err(Self::Err::InvalidFormat {
                full_constraint: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0.lower(), self.0.upper()) {
            _ if self.0.is_empty() => write!(f, "1.0.0 <= v < 1.0.0"),
            (Bound::Inclusive(lo), Bound::Exclusive(hi)) => write!(f, "{} <= v < {}", lo, hi),
            (Bound::Inclusive(lo), Bound::Inclusive(hi)) => write!(f, "{} <= v <= {}", lo, hi),
            (Bound::Exclusive(lo), Bound::Exclusive(hi)) => write!(f, "{} < v < {}", lo, hi),
            (Bound::Exclusive(lo), Bound::Inclusive(hi)) => write!(f, "{} < v <= {}", lo, hi),
            _ => write!(f, "{}", self.0),
        }
    }
}

impl Serialize for Constraint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_standard_constraint() {
        let c: Constraint = "1.0.0 <= v < 2.0.0".parse().unwrap();
        assert!(c.0.contains(Version::new(1, 0, 0)));
        assert!(c.0.contains(Version::new(1, 9, 9)));
        assert!(!c.0.contains(Version::new(2, 0, 0)));
    }

    #[test]
    fn parse_exclusive_lower() {
        let c: Constraint = "1.0.0 < v < 2.0.0".parse().unwrap();
        assert!(!c.0.contains(Version::new(1, 0, 0)));
        assert!(c.0.contains(Version::new(1, 0, 1)));
    }

    #[test]
    fn parse_inclusive_upper() {
        let c: Constraint = "1.0.0 <= v <= 2.0.0".parse().unwrap();
        assert!(c.0.contains(Version::new(2, 0, 0)));
        assert!(!c.0.contains(Version::new(2, 0, 1)));
    }

    #[test]
    fn parse_exact_form() {
        let c: Constraint = "1.2.3".parse().unwrap();
        assert_eq!(c.0.as_exact(), Some(Version::new(1, 2, 3)));
    }

    #[test]
    fn reject_bad_separator() {
        assert!(matches!(
            Constraint::from_str("1.0.0 >= v < 2.0.0"),
            Err(ConstraintParseError::InvalidSeparator { .. })
        ));
    }

    #[test]
    fn reject_bad_shape() {
        assert!(matches!(
            Constraint::from_str("1.0.0 <= v"),
            Err(ConstraintParseError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn display_roundtrip() {
        let c: Constraint = "1.0.0 <= v < 2.0.0".parse().unwrap();
        assert_eq!(c.to_string(), "1.0.0 <= v < 2.0.0");
        let back: Constraint = c.to_string().parse().unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn serde_as_string() {
        let c: Constraint = serde_json::from_str("\"1.0.0 <= v < 2.0.0\"").unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"1.0.0 <= v < 2.0.0\"");
    }
}
