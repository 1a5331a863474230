// SPDX-License-Identifier: MPL-2.0

//! Incompatibilities: sets of terms that can never all hold together,
//! owned by an arena store and referenced by stable indices.
//!
//! The causes of derived incompatibilities form a DAG rooted at
//! dependency, no-versions and root nodes; holding ids instead of
//! references keeps the DAG acyclic at the type level.

use crate::solver::term::{PackageId, Term};
use crate::version::Range;

/// Stable index of an incompatibility inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IncompatId(pub u32);

impl IncompatId {
    /// Index into the store's backing vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where an incompatibility comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Dependency edge: the first term's package, at its decided range,
    /// depends on the second term's package in the required range.
    Dependency,
    /// The positive term's range contains no surviving version.
    NoVersions,
    /// A dependency of the project itself.
    Root,
    /// Derived from two prior incompatibilities during conflict resolution.
    Internal,
}

/// A finite set of terms that cannot all hold simultaneously.
#[derive(Debug, Clone)]
pub struct Incompatibility {
    /// The terms. A dependency incompatibility has exactly two.
    pub terms: Vec<Term>,
    /// Provenance of the incompatibility.
    pub reason: Reason,
    /// The two prior incompatibilities this one was derived from.
    pub causes: Option<(IncompatId, IncompatId)>,
    /// Whether the incompatibility participates in unit propagation.
    pub attached: bool,
}

impl Incompatibility {
    /// Dependency incompatibility: `depender` at `depender_range`
    /// requires `dependency` in `required`.
    pub fn from_dependency(
        depender: PackageId,
        depender_range: Range,
        dependency: PackageId,
        required: Range,
    ) -> Self {
        Self {
            terms: vec![
                Term::positive(depender, depender_range),
                Term::negative(dependency, required),
            ],
            reason: Reason::Dependency,
            causes: None,
            attached: false,
        }
    }

    /// Root dependency incompatibility: the project requires
    /// `dependency` in `required`.
    pub fn from_root_dependency(root_range: Range, dependency: PackageId, required: Range) -> Self {
        Self {
            terms: vec![
                Term::positive(PackageId::ROOT, root_range),
                Term::negative(dependency, required),
            ],
            reason: Reason::Root,
            causes: None,
            attached: false,
        }
    }

    /// No-versions incompatibility: no surviving version of `package`
    /// lies in `range`.
    pub fn no_versions(package: PackageId, range: Range) -> Self {
        Self {
            terms: vec![Term::positive(package, range)],
            reason: Reason::NoVersions,
            causes: None,
            attached: false,
        }
    }

    /// Whether this incompatibility ends the algorithm: no term left,
    /// or a single term on the root package.
    pub fn is_terminal(&self) -> bool {
        match self.terms.as_slice() {
            [] => true,
            [term] => term.package == PackageId::ROOT,
            _ => false,
        }
    }

    /// Whether this incompatibility was derived rather than externally given.
    pub fn is_derived(&self) -> bool {
        self.causes.is_some()
    }

    /// Iterate over the distinct packages named by the terms.
    pub fn packages(&self) -> impl Iterator<Item = PackageId> + '_ {
        let mut seen = Vec::new();
        self.terms.iter().filter_map(move |t| {
            if seen.contains(&t.package) {
                None
            } else {
                seen.push(t.package);
                Some(t.package)
            }
        })
    }
}

/// Owning arena of all incompatibilities created during one solve.
///
/// Watch lists and causes reference entries by [IncompatId].
#[derive(Debug, Default)]
pub struct IncompatStore {
    entries: Vec<Incompatibility>,
}

impl IncompatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an incompatibility into the store, returning its id.
    pub fn alloc(&mut self, incompat: Incompatibility) -> IncompatId {
        let id = IncompatId(self.entries.len() as u32);
        self.entries.push(incompat);
        id
    }

    /// Borrow an incompatibility.
    pub fn get(&self, id: IncompatId) -> &Incompatibility {
        &self.entries[id.index()]
    }

    /// Mutably borrow an incompatibility.
    pub fn get_mut(&mut self, id: IncompatId) -> &mut Incompatibility {
        &mut self.entries[id.index()]
    }

    /// Number of incompatibilities allocated so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is still empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolution of two incompatibilities over a package:
    /// the union of both term sets minus every term mentioning `package`.
    ///
    /// The result is tracked in the store but not yet attached.
    pub fn resolve(
        &mut self,
        left: IncompatId,
        right: IncompatId,
        package: PackageId,
    ) -> IncompatId {
        let mut terms: Vec<Term> = Vec::new();
        for &source in [left, right].iter() {
            for term in &self.get(source).terms {
                if term.package != package && !terms.contains(term) {
                    terms.push(*term);
                }
            }
        }
        self.alloc(Incompatibility {
            terms,
            reason: Reason::Internal,
            causes: Some((left, right)),
            attached: false,
        })
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn r(low: (u32, u32, u32), high: (u32, u32, u32)) -> Range {
        Range::between(Version::from(low), Version::from(high))
    }

    #[test]
    fn dependency_shape() {
        let incompat =
            Incompatibility::from_dependency(PackageId(1), r((1, 0, 0), (1, 0, 1)), PackageId(2), r((2, 0, 0), (3, 0, 0)));
        assert_eq!(incompat.terms.len(), 2);
        assert!(incompat.terms[0].positive);
        assert!(!incompat.terms[1].positive);
        assert_eq!(incompat.reason, Reason::Dependency);
        assert!(!incompat.is_terminal());
    }

    #[test]
    fn terminal_shapes() {
        let empty = Incompatibility {
            terms: vec![],
            reason: Reason::Internal,
            causes: None,
            attached: false,
        };
        assert!(empty.is_terminal());
        let root_only = Incompatibility {
            terms: vec![Term::positive(PackageId::ROOT, Range::any())],
            reason: Reason::Root,
            causes: None,
            attached: false,
        };
        assert!(root_only.is_terminal());
        let no_versions = Incompatibility::no_versions(PackageId(3), r((1, 0, 0), (2, 0, 0)));
        assert!(!no_versions.is_terminal());
    }

    #[test]
    fn resolve_removes_pivot_terms() {
        let mut store = IncompatStore::new();
        let p1 = PackageId(1);
        let p2 = PackageId(2);
        let p3 = PackageId(3);
        let a = store.alloc(Incompatibility {
            terms: vec![
                Term::positive(p1, r((1, 0, 0), (2, 0, 0))),
                Term::negative(p2, r((1, 0, 0), (2, 0, 0))),
            ],
            reason: Reason::Dependency,
            causes: None,
            attached: false,
        });
        let b = store.alloc(Incompatibility {
            terms: vec![
                Term::positive(p2, r((1, 0, 0), (2, 0, 0))),
                Term::negative(p3, r((1, 0, 0), (2, 0, 0))),
            ],
            reason: Reason::Dependency,
            causes: None,
            attached: false,
        });
        let resolved = store.resolve(a, b, p2);
        let incompat = store.get(resolved);
        assert_eq!(incompat.reason, Reason::Internal);
        assert_eq!(incompat.causes, Some((a, b)));
        let pkgs: Vec<PackageId> = incompat.packages().collect();
        assert_eq!(pkgs, vec![p1, p3]);
    }
}
