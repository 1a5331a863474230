// SPDX-License-Identifier: MPL-2.0

//! Narrative rendering of solver failures.
//!
//! Walks the cause DAG of the stored root incompatibility and emits a
//! numbered explanation. Every incompatibility referenced by two
//! parents is printed once and thereafter referenced by its line
//! number, assigned on demand.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::project_config::Pkg;
use crate::solver::incompat::{IncompatId, IncompatStore, Reason};
use crate::solver::term::{PackageId, Term};
use crate::version::Range;

/// Render the failure narrative for the stored root incompatibility.
pub fn explain(
    store: &IncompatStore,
    root: IncompatId,
    names: &dyn Fn(PackageId) -> Pkg,
) -> String {
    if !store.get(root).is_derived() {
        return format!("Because {}, version solving failed.", external(store, root, names));
    }
    let mut reporter = Reporter {
        store,
        names,
        shared: shared_ids(store, root),
        lines: FxHashMap::default(),
        line_index: FxHashMap::default(),
        counter: 0,
        out: Vec::new(),
    };
    reporter.visit(root, true);
    reporter.out.join("\n")
}

/// Derived incompatibilities referenced by more than one parent in the
/// DAG reachable from the root.
fn shared_ids(store: &IncompatStore, root: IncompatId) -> FxHashSet<IncompatId> {
    let mut refs: FxHashMap<IncompatId, u32> = FxHashMap::default();
    let mut stack = vec![root];
    let mut visited: FxHashSet<IncompatId> = FxHashSet::default();
    while let Some(id) = stack.pop() {
        if let Some((left, right)) = store.get(id).causes {
            for child in [left, right] {
                if store.get(child).is_derived() {
                    *refs.entry(child).or_insert(0) += 1;
                    if visited.insert(child) {
                        stack.push(child);
                    }
                }
            }
        }
    }
    refs.into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id)
        .collect()
}

struct Reporter<'a> {
    store: &'a IncompatStore,
    names: &'a dyn Fn(PackageId) -> Pkg,
    shared: FxHashSet<IncompatId>,
    lines: FxHashMap<IncompatId, usize>,
    line_index: FxHashMap<IncompatId, usize>,
    counter: usize,
    out: Vec<String>,
}

impl<'a> Reporter<'a> {
    fn visit(&mut self, id: IncompatId, top: bool) {
        let (left, right) = match self.store.get(id).causes {
            Some(causes) => causes,
            None => {
                // An external at the top can only happen for a root
                // single-term incompatibility.
                self.push_line(id, top, format!("Because {}", self.external(id)));
                return;
            }
        };
        match (
            self.store.get(left).is_derived(),
            self.store.get(right).is_derived(),
        ) {
            (false, false) => {
                let text = format!("Because {} and {}", self.external(left), self.external(right));
                self.push_line(id, top, text);
            }
            (true, true) => self.visit_two_derived(id, top, left, right),
            (true, false) => self.visit_mixed(id, top, left, right),
            (false, true) => self.visit_mixed(id, top, right, left),
        }
    }

    fn visit_two_derived(&mut self, id: IncompatId, top: bool, left: IncompatId, right: IncompatId) {
        match (self.lines.get(&left).copied(), self.lines.get(&right).copied()) {
            (Some(n1), Some(n2)) => {
                let text = format!(
                    "Because {} ({}) and {} ({})",
                    self.conclusion(left),
                    n1,
                    self.conclusion(right),
                    n2
                );
                self.push_line(id, top, text);
            }
            (Some(n), None) => {
                self.visit(right, false);
                let text = format!("And because {} ({})", self.conclusion(left), n);
                self.push_line(id, top, text);
            }
            (None, Some(n)) => {
                self.visit(left, false);
                let text = format!("And because {} ({})", self.conclusion(right), n);
                self.push_line(id, top, text);
            }
            (None, None) => {
                // Explain the complex branch first when one is simple.
                let (first, second) = if self.is_simple(left) && !self.is_simple(right) {
                    (right, left)
                } else {
                    (left, right)
                };
                self.visit(first, false);
                if let Some(n) = self.lines.get(&second).copied() {
                    // The second branch was printed while visiting the
                    // first one (shared incompatibility).
                    let text = format!("And because {} ({})", self.conclusion(second), n);
                    self.push_line(id, top, text);
                } else if self.is_simple(second) {
                    self.print_simple(second);
                    self.push_line(id, top, "Thus".to_string());
                } else {
                    let n = self.ensure_numbered(first);
                    self.visit(second, false);
                    let text = format!("And because {} ({})", self.conclusion(first), n);
                    self.push_line(id, top, text);
                }
            }
        }
    }

    fn visit_mixed(&mut self, id: IncompatId, top: bool, derived: IncompatId, ext: IncompatId) {
        if let Some(n) = self.lines.get(&derived).copied() {
            let text = format!(
                "Because {} and {} ({})",
                self.external(ext),
                self.conclusion(derived),
                n
            );
            self.push_line(id, top, text);
        } else if self.is_simple(derived) {
            // Inline the simple derived cause with its two externals.
            self.print_simple(derived);
            let text = format!("And because {}", self.external(ext));
            self.push_line(id, top, text);
        } else {
            self.visit(derived, false);
            let text = format!("And because {}", self.external(ext));
            self.push_line(id, top, text);
        }
    }

    /// A derived incompatibility whose two causes are both external.
    fn is_simple(&self, id: IncompatId) -> bool {
        match self.store.get(id).causes {
            Some((left, right)) => {
                !self.store.get(left).is_derived() && !self.store.get(right).is_derived()
            }
            None => false,
        }
    }

    fn print_simple(&mut self, id: IncompatId) {
        if let Some((left, right)) = self.store.get(id).causes {
            let text = format!("Because {} and {}", self.external(left), self.external(right));
            self.push_line(id, false, text);
        }
    }

    fn push_line(&mut self, id: IncompatId, top: bool, prefix: String) {
        let conclusion = if top {
            "version solving failed".to_string()
        } else {
            self.conclusion(id)
        };
        let mut text = format!("{}, {}.", prefix, conclusion);
        if self.shared.contains(&id) && !self.lines.contains_key(&id) {
            self.counter += 1;
            self.lines.insert(id, self.counter);
            text.push_str(&format!(" ({})", self.counter));
        }
        self.line_index.insert(id, self.out.len());
        self.out.push(text);
    }

    /// Give an already printed line a reference number if it has none.
    fn ensure_numbered(&mut self, id: IncompatId) -> usize {
        if let Some(n) = self.lines.get(&id) {
            return *n;
        }
        self.counter += 1;
        let n = self.counter;
        self.lines.insert(id, n);
        if let Some(&index) = self.line_index.get(&id) {
            self.out[index].push_str(&format!(" ({})", n));
        }
        n
    }

    fn external(&self, id: IncompatId) -> String {
        external(self.store, id, self.names)
    }

    /// Phrase the statement a derived incompatibility stands for.
    fn conclusion(&self, id: IncompatId) -> String {
        let incompat = self.store.get(id);
        match incompat.terms.as_slice() {
            [] => "version solving failed".to_string(),
            [term] if term.package == PackageId::ROOT => "version solving failed".to_string(),
            [term] if term.positive => format!(
                "{} is forbidden",
                self.package_at(term)
            ),
            [term] => format!("{} is required", self.package_at(term)),
            [first, second] if first.positive && !second.positive => format!(
                "{} requires {}",
                self.package_at(first),
                self.package_at(second)
            ),
            [first, second] if !first.positive && second.positive => format!(
                "{} requires {}",
                self.package_at(second),
                self.package_at(first)
            ),
            [first, second] if first.positive && second.positive => format!(
                "{} and {} are incompatible",
                self.package_at(first),
                self.package_at(second)
            ),
            terms => {
                let rendered: Vec<String> =
                    terms.iter().map(|t| self.package_at(t)).collect();
                format!("{} cannot all hold", rendered.join(", "))
            }
        }
    }

    fn package_at(&self, term: &Term) -> String {
        package_at((self.names)(term.package), term.range)
    }
}

fn package_at(pkg: Pkg, range: Range) -> String {
    if range == Range::any() {
        format!("{}", pkg)
    } else {
        format!("{} {}", pkg, range)
    }
}

fn external(store: &IncompatStore, id: IncompatId, names: &dyn Fn(PackageId) -> Pkg) -> String {
    let incompat = store.get(id);
    match incompat.reason {
        Reason::Dependency => match dependency_terms(incompat.terms.as_slice()) {
            Some((depender, dependency)) => format!(
                "{} depends on {}",
                package_at(names(depender.package), depender.range),
                package_at(names(dependency.package), dependency.range)
            ),
            None => "a dependency holds".to_string(),
        },
        Reason::Root => match dependency_terms(incompat.terms.as_slice()) {
            Some((_, dependency)) => format!(
                "the project depends on {}",
                package_at(names(dependency.package), dependency.range)
            ),
            None => "the project constraints hold".to_string(),
        },
        Reason::NoVersions => match incompat.terms.first() {
            Some(term) => format!(
                "no versions of {} satisfy the constraints {}",
                names(term.package),
                term.range
            ),
            None => "no versions are available".to_string(),
        },
        Reason::Internal => {
            // Derived incompatibilities are phrased by `conclusion`.
            "a derived constraint holds".to_string()
        }
    }
}

/// Split the two terms of a dependency-shaped incompatibility into
/// (depender positive, dependency negative).
fn dependency_terms(terms: &[Term]) -> Option<(&Term, &Term)> {
    match terms {
        [first, second] if first.positive => Some((first, second)),
        [first, second] => Some((second, first)),
        _ => None,
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::incompat::Incompatibility;
    use crate::version::Version;

    fn names(p: PackageId) -> Pkg {
        match p.0 {
            0 => Pkg::new("root", ""),
            1 => Pkg::new("a", "x"),
            2 => Pkg::new("a", "y"),
            _ => Pkg::new("a", "z"),
        }
    }

    fn v(major: u32, minor: u32, patch: u32) -> Version {
        Version::new(major, minor, patch)
    }

    #[test]
    fn two_external_causes() {
        let mut store = IncompatStore::new();
        let x = PackageId(1);
        let y = PackageId(2);
        let dep = store.alloc(Incompatibility::from_dependency(
            x,
            Range::exact(v(1, 0, 0)),
            y,
            Range::between(v(2, 0, 0), v(3, 0, 0)),
        ));
        let nv = store.alloc(Incompatibility::no_versions(
            y,
            Range::between(v(2, 0, 0), v(3, 0, 0)),
        ));
        let root = store.alloc(Incompatibility {
            terms: vec![],
            reason: Reason::Internal,
            causes: Some((nv, dep)),
            attached: false,
        });
        let narrative = explain(&store, root, &names);
        assert_eq!(
            narrative,
            "Because no versions of a/y satisfy the constraints 2.0.0 <= v < 3.0.0 \
             and a/x 1.0.0 depends on a/y 2.0.0 <= v < 3.0.0, version solving failed."
        );
    }

    #[test]
    fn derived_plus_external_inlines_simple_cause() {
        let mut store = IncompatStore::new();
        let x = PackageId(1);
        let y = PackageId(2);
        let dep = store.alloc(Incompatibility::from_dependency(
            x,
            Range::exact(v(1, 0, 0)),
            y,
            Range::between(v(2, 0, 0), v(3, 0, 0)),
        ));
        let nv_x = store.alloc(Incompatibility::no_versions(x, Range::any()));
        let middle = store.alloc(Incompatibility {
            terms: vec![Term::negative(y, Range::between(v(2, 0, 0), v(3, 0, 0)))],
            reason: Reason::Internal,
            causes: Some((nv_x, dep)),
            attached: false,
        });
        let nv_y = store.alloc(Incompatibility::no_versions(
            y,
            Range::between(v(2, 0, 0), v(3, 0, 0)),
        ));
        let root = store.alloc(Incompatibility {
            terms: vec![],
            reason: Reason::Internal,
            causes: Some((middle, nv_y)),
            attached: false,
        });
        let narrative = explain(&store, root, &names);
        let lines: Vec<&str> = narrative.lines().collect();
        assert_eq!(lines.len(), 2, "{}", narrative);
        assert!(
            lines[0].contains("no versions of a/x satisfy"),
            "{}",
            narrative
        );
        assert!(lines[0].contains("depends on a/y"), "{}", narrative);
        assert!(
            lines[1].contains("no versions of a/y satisfy"),
            "{}",
            narrative
        );
        assert!(lines[1].ends_with("version solving failed."), "{}", narrative);
    }

    #[test]
    fn shared_incompatibility_gets_a_line_number() {
        let mut store = IncompatStore::new();
        let x = PackageId(1);
        let y = PackageId(2);
        let z = PackageId(3);
        let e1 = store.alloc(Incompatibility::from_dependency(
            x,
            Range::exact(v(1, 0, 0)),
            y,
            Range::any(),
        ));
        let e2 = store.alloc(Incompatibility::no_versions(y, Range::any()));
        // One derived incompatibility referenced by both branches.
        let shared = store.alloc(Incompatibility {
            terms: vec![Term::positive(x, Range::exact(v(1, 0, 0)))],
            reason: Reason::Internal,
            causes: Some((e1, e2)),
            attached: false,
        });
        let e3 = store.alloc(Incompatibility::from_dependency(
            x,
            Range::exact(v(1, 0, 0)),
            z,
            Range::any(),
        ));
        let left = store.alloc(Incompatibility {
            terms: vec![Term::negative(z, Range::any())],
            reason: Reason::Internal,
            causes: Some((shared, e3)),
            attached: false,
        });
        let root = store.alloc(Incompatibility {
            terms: vec![],
            reason: Reason::Internal,
            causes: Some((left, shared)),
            attached: false,
        });
        let narrative = explain(&store, root, &names);
        assert!(narrative.contains("(1)"), "{}", narrative);
        assert!(narrative.ends_with("version solving failed."), "{}", narrative);
    }

    #[test]
    fn external_root_is_a_single_line() {
        let mut store = IncompatStore::new();
        let y = PackageId(2);
        let nv = store.alloc(Incompatibility::no_versions(
            y,
            Range::between(v(2, 0, 0), v(3, 0, 0)),
        ));
        let narrative = explain(&store, nv, &names);
        assert_eq!(
            narrative,
            "Because no versions of a/y satisfy the constraints 2.0.0 <= v < 3.0.0, \
             version solving failed."
        );
    }
}
