// SPDX-License-Identifier: MPL-2.0

//! Terms: polarised package-and-range pairs, and their evaluation
//! against the accumulated assignments of a package.

use std::fmt;

use crate::version::Range;

/// An interned package identifier.
///
/// Id 0 is reserved for the synthetic root package. The solver only ever
/// manipulates these small integers; author/name strings stay in the
/// provider's interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(pub u32);

impl PackageId {
    /// The synthetic root package.
    pub const ROOT: PackageId = PackageId(0);

    /// Index into per-package arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A polarised package-and-range pair.
///
/// A positive term requires the package's version to lie in the range;
/// a negative term forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Term {
    /// The package the term constrains.
    pub package: PackageId,
    /// The version range.
    pub range: Range,
    /// Polarity: positive requires, negative forbids.
    pub positive: bool,
}

impl Term {
    /// A positive term: the package must be in the range.
    pub fn positive(package: PackageId, range: Range) -> Self {
        Self {
            package,
            range,
            positive: true,
        }
    }

    /// A negative term: the package must not be in the range.
    pub fn negative(package: PackageId, range: Range) -> Self {
        Self {
            package,
            range,
            positive: false,
        }
    }

    /// The negation of this term, as derived by unit propagation.
    pub fn negate(&self) -> Self {
        Self {
            package: self.package,
            range: self.range,
            positive: !self.positive,
        }
    }
}

/// State of a term relative to the current trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermState {
    /// Every extension of the trail entails the term.
    Satisfied,
    /// Every extension of the trail falsifies the term.
    Contradicted,
    /// Neither.
    Inconclusive,
}

/// Accumulated view of all assignments of one package:
/// the intersection of its positive ranges and the list of its
/// negative ranges.
#[derive(Debug, Clone, Default)]
pub struct PkgAssignments {
    /// Intersection of all positive assignment ranges, if any exist.
    pub positive: Option<Range>,
    /// Ranges of all negative assignments.
    pub negatives: Vec<Range>,
}

impl PkgAssignments {
    /// Record one more assignment range on this package.
    pub fn record(&mut self, range: Range, positive: bool) {
        if positive {
            self.positive = Some(match self.positive {
                Some(acc) => acc.intersection(&range),
                None => range,
            });
        } else {
            self.negatives.push(range);
        }
    }

    /// Intersection of positive ranges, where no positive assignment
    /// behaves as the full range.
    pub fn positive_or_any(&self) -> Range {
        self.positive.unwrap_or_else(Range::any)
    }

    /// Evaluate a term on this package against the accumulated assignments.
    pub fn term_state(&self, term: &Term) -> TermState {
        let derived = self.positive_or_any();
        if term.positive {
            if derived.is_subset_of(&term.range) && self.positive.is_some() {
                TermState::Satisfied
            } else if derived.is_disjoint(&term.range)
                || self.negatives.iter().any(|n| term.range.is_subset_of(n))
            {
                TermState::Contradicted
            } else {
                TermState::Inconclusive
            }
        } else {
            // Negative term: forbidden range must be unreachable.
            if (self.positive.is_some() && derived.is_disjoint(&term.range))
                || self.negatives.iter().any(|n| term.range.is_subset_of(n))
            {
                TermState::Satisfied
            } else if self.positive.is_some() && derived.is_subset_of(&term.range) {
                TermState::Contradicted
            } else {
                TermState::Inconclusive
            }
        }
    }

    /// Evaluate a term as if the package additionally had a positive
    /// exact assignment on `candidate`. Used by the decision look-ahead.
    pub fn term_state_with(&self, term: &Term, candidate: Range) -> TermState {
        let mut speculative = self.clone();
        speculative.record(candidate, true);
        speculative.term_state(term)
    }
}

// TESTS #######################################################################
