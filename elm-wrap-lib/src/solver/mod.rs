// SPDX-License-Identifier: MPL-2.0

//! PubGrub-style dependency solver.
//!
//! The solver runs a decision/propagation loop over an append-only trail
//! of assignments. Conflicts are resolved by deriving new
//! incompatibilities through the rule of resolution, then backjumping to
//! the level computed by the satisfier search. On failure, the cause DAG
//! of the final incompatibility is rendered into a numbered narrative.
//!
//! The solver performs no I/O of its own: every question about the
//! package world goes through the [DependencyProvider]. Root constraints
//! enter twice, as non-negotiable facts at decision level 0 and as root
//! dependency incompatibilities used by the failure narrative.

pub mod incompat;
pub mod provider;
pub mod report;
pub mod term;

use std::collections::BTreeMap;

use crate::project_config::Pkg;
use crate::version::{Range, Version};

use incompat::{IncompatId, IncompatStore, Incompatibility, Reason};
use provider::{DependencyProvider, ProviderStats};
use term::{PackageId, PkgAssignments, Term, TermState};

/// Hard cap on the number of decisions in one solve.
pub const PG_MAX_DECISIONS: u64 = 200_000;
/// Hard cap on the number of incompatibility evaluations in one solve.
pub const PG_MAX_PROPAGATIONS: u64 = 1_000_000;
/// Hard cap on the number of conflicts in one solve.
pub const PG_MAX_CONFLICTS: u64 = 200_000;
/// Hard cap on the number of interned packages.
pub const PG_MAX_PACKAGES: usize = 10_000;
/// Hard cap on the trail length.
pub const PG_MAX_TRAIL_ASSIGNMENTS: usize = 200_000;
/// Hard cap on the number of incompatibilities.
pub const PG_MAX_INCOMPATIBILITIES: usize = 200_000;

/// One element of the trail.
///
/// A decision is an exact positive assignment with no cause; a
/// derivation carries the incompatibility that forced it. Root
/// dependencies are derivations at level 0 with no cause.
#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    /// The package assigned.
    pub package: PackageId,
    /// The assigned range.
    pub range: Range,
    /// Polarity of the assignment.
    pub positive: bool,
    /// Whether this is a decision.
    pub decided: bool,
    /// Decision level the assignment belongs to.
    pub decision_level: u32,
    /// The unit incompatibility that forced a derivation.
    pub cause: Option<IncompatId>,
}

/// Counters accumulated during one solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverStats {
    /// Decisions taken.
    pub decisions: u64,
    /// Incompatibility evaluations during unit propagation.
    pub propagations: u64,
    /// Conflicts resolved.
    pub conflicts: u64,
    /// Incompatibilities learned through resolution.
    pub learned: u64,
    /// Provider-side counters.
    pub provider: ProviderStats,
}

/// Status of a finished solve.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    /// A complete assignment satisfying every registered constraint.
    Solution(BTreeMap<Pkg, Version>),
    /// No assignment exists; the narrative explains why.
    NoSolution {
        /// Numbered narrative derived from the cause DAG.
        explanation: String,
    },
}

/// Error type for aborted solves.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    /// One of the hard caps was exceeded. Surfaced as an internal error,
    /// never as a no-solution verdict.
    #[error("internal error: solver cap exceeded ({0})")]
    CapExceeded(&'static str),

    /// The provider failed to answer.
    #[error(transparent)]
    Provider(#[from] provider::ProviderError),
}

#[derive(Debug, Clone, Default)]
struct PkgState {
    used: bool,
    has_decision: bool,
    decision_version: Option<Version>,
    derived: PkgAssignments,
}

enum Evaluation {
    Satisfied,
    Contradicted,
    Unit(usize),
    Inconclusive,
}

enum DecideOutcome {
    Decided,
    /// A no-versions conflict, with the known version list of the
    /// package kept around for the satisfier search.
    Conflict {
        id: IncompatId,
        versions: Vec<Version>,
    },
    Done,
}

enum Resolution {
    NoSolution(IncompatId),
    Backjump { learned: IncompatId, level: u32 },
}

struct SatisfierSearch {
    index: usize,
    term: Term,
    previous_level: u32,
}

/// The solver. Created per solve and dropped at its end; it owns the
/// trail and the incompatibility store, and borrows its provider.
pub struct Solver<'a, P: DependencyProvider> {
    provider: &'a mut P,
    trail: Vec<Assignment>,
    pkg_states: Vec<PkgState>,
    pkg_incompats: Vec<Vec<IncompatId>>,
    store: IncompatStore,
    current_level: u32,
    changed: Vec<PackageId>,
    stats: SolverStats,
}

impl<'a, P: DependencyProvider> Solver<'a, P> {
    /// Create a solver over a provider whose root dependencies are set.
    pub fn new(provider: &'a mut P) -> Self {
        Self {
            provider,
            trail: Vec::new(),
            pkg_states: Vec::new(),
            pkg_incompats: Vec::new(),
            store: IncompatStore::new(),
            current_level: 0,
            changed: Vec::new(),
            stats: SolverStats::default(),
        }
    }

    /// Run the solve loop to completion.
    pub fn solve(mut self) -> Result<SolveOutcome, SolveError> {
        self.init_root()?;
        let outcome = loop {
            let conflict = match self.propagate()? {
                Some(id) => Some((id, Vec::new())),
                None => match self.decide()? {
                    DecideOutcome::Decided => None,
                    DecideOutcome::Conflict { id, versions } => Some((id, versions)),
                    DecideOutcome::Done => break self.success(),
                },
            };
            if let Some((conflict, nv_versions)) = conflict {
                self.stats.conflicts += 1;
                if self.stats.conflicts > PG_MAX_CONFLICTS {
                    return Err(SolveError::CapExceeded("conflicts"));
                }
                match self.resolve_conflict(conflict, &nv_versions)? {
                    Resolution::NoSolution(root) => break self.failure(root),
                    Resolution::Backjump { learned, level } => {
                        self.attach(learned);
                        log::debug!("learned {:?}, backjump to level {}", learned, level);
                        self.backtrack_to(level);
                        let packages: Vec<PackageId> =
                            self.store.get(learned).packages().collect();
                        for package in packages {
                            self.enqueue(package);
                        }
                    }
                }
            }
        };
        self.stats.provider = self.provider.stats();
        log::debug!(
            "solver stats: {} decisions, {} propagations, {} conflicts, {} learned",
            self.stats.decisions,
            self.stats.propagations,
            self.stats.conflicts,
            self.stats.learned
        );
        Ok(outcome)
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    // Initialization ##########################################################

    /// Push the root dependencies as level 0 facts, the root decision at
    /// level 1, and register the root dependency incompatibilities.
    fn init_root(&mut self) -> Result<(), SolveError> {
        let root_deps = self.provider.dependencies(PackageId::ROOT, Version::zero())?;
        for &(dep, range) in &root_deps {
            self.push_assignment(Assignment {
                package: dep,
                range,
                positive: true,
                decided: false,
                decision_level: 0,
                cause: None,
            })?;
        }
        self.current_level = 1;
        self.stats.decisions += 1;
        self.push_assignment(Assignment {
            package: PackageId::ROOT,
            range: Range::exact(Version::zero()),
            positive: true,
            decided: true,
            decision_level: 1,
            cause: None,
        })?;
        for &(dep, range) in &root_deps {
            let incompat =
                Incompatibility::from_root_dependency(Range::exact(Version::zero()), dep, range);
            let id = self.alloc_incompat(incompat)?;
            self.attach(id);
        }
        Ok(())
    }

    // Unit propagation ########################################################

    /// Pop changed packages and scan their watch lists, deriving the
    /// negation of the single inconclusive term of almost-satisfied
    /// incompatibilities. Returns the first fully satisfied
    /// incompatibility, which is a conflict.
    fn propagate(&mut self) -> Result<Option<IncompatId>, SolveError> {
        while let Some(package) = self.changed.pop() {
            // Scan the whole watch list before moving to the next
            // package: one derivation can unit-propagate another
            // incompatibility of the same list.
            let watched = self.pkg_incompats[package.index()].clone();
            for id in watched {
                self.stats.propagations += 1;
                if self.stats.propagations > PG_MAX_PROPAGATIONS {
                    return Err(SolveError::CapExceeded("propagations"));
                }
                match self.evaluate(id) {
                    Evaluation::Contradicted | Evaluation::Inconclusive => {}
                    Evaluation::Satisfied => return Ok(Some(id)),
                    Evaluation::Unit(term_index) => {
                        let term = self.store.get(id).terms[term_index].negate();
                        log::trace!("derive {:?} from {:?}", term, id);
                        self.push_assignment(Assignment {
                            package: term.package,
                            range: term.range,
                            positive: term.positive,
                            decided: false,
                            decision_level: self.current_level,
                            cause: Some(id),
                        })?;
                    }
                }
            }
        }
        Ok(None)
    }

    fn evaluate(&self, id: IncompatId) -> Evaluation {
        let incompat = self.store.get(id);
        let mut inconclusive = None;
        for (index, term) in incompat.terms.iter().enumerate() {
            match self.term_state(term) {
                TermState::Contradicted => return Evaluation::Contradicted,
                TermState::Satisfied => {}
                TermState::Inconclusive => {
                    if inconclusive.is_some() {
                        return Evaluation::Inconclusive;
                    }
                    inconclusive = Some(index);
                }
            }
        }
        match inconclusive {
            None => Evaluation::Satisfied,
            Some(index) => Evaluation::Unit(index),
        }
    }

    fn term_state(&self, term: &Term) -> TermState {
        match self.pkg_states.get(term.package.index()) {
            Some(state) => state.derived.term_state(term),
            None => TermState::Inconclusive,
        }
    }

    // Decision ################################################################

    /// Among used, undecided packages with a non-empty positive range,
    /// pick the one with the fewest feasible versions (ties broken by
    /// smallest id) and decide its newest feasible version.
    ///
    /// A version is feasible when it lies in the derived positive range,
    /// no negative assignment contains it, and the look-ahead does not
    /// flag it as immediately conflicting. When only the last two
    /// filters empty the list, the newest surviving in-range version is
    /// decided anyway so the conflict surfaces through propagation with
    /// its real causes; a no-versions incompatibility is only emitted
    /// when the range itself has no version, or none survives the
    /// level 0 facts.
    fn decide(&mut self) -> Result<DecideOutcome, SolveError> {
        let candidates: Vec<(PackageId, Range, Vec<Range>)> = self
            .pkg_states
            .iter()
            .enumerate()
            .filter_map(|(index, state)| {
                if !state.used || state.has_decision {
                    return None;
                }
                // An empty positive range is kept: it surfaces below as
                // a no-versions conflict instead of being skipped.
                state.derived.positive.map(|range| {
                    (
                        PackageId(index as u32),
                        range,
                        state.derived.negatives.clone(),
                    )
                })
            })
            .collect();

        let mut best: Option<(PackageId, Version, usize)> = None;
        for (package, positive, negatives) in candidates {
            let versions = self.provider.versions(package)?;
            if self.provider.package_count() > PG_MAX_PACKAGES {
                return Err(SolveError::CapExceeded("packages"));
            }
            let in_range: Vec<Version> = versions
                .iter()
                .copied()
                .filter(|v| positive.contains(*v))
                .collect();
            if in_range.is_empty() {
                let id = self.alloc_incompat(Incompatibility::no_versions(package, positive))?;
                self.attach(id);
                return Ok(DecideOutcome::Conflict { id, versions });
            }
            let level0_negatives: Vec<Range> = self
                .trail
                .iter()
                .filter(|a| a.package == package && !a.positive && a.decision_level == 0)
                .map(|a| a.range)
                .collect();
            let permanent_survivors: Vec<Version> = in_range
                .iter()
                .copied()
                .filter(|v| !level0_negatives.iter().any(|n| n.contains(*v)))
                .collect();
            if permanent_survivors.is_empty() {
                // Every in-range version is forbidden by level 0
                // derivations; their causes are chained by the
                // satisfier search.
                let id = self.alloc_incompat(Incompatibility::no_versions(package, positive))?;
                return Ok(DecideOutcome::Conflict { id, versions });
            }
            let unexcluded: Vec<Version> = in_range
                .iter()
                .copied()
                .filter(|v| !negatives.iter().any(|n| n.contains(*v)))
                .collect();
            let feasible: Vec<Version> = unexcluded
                .iter()
                .copied()
                .filter(|v| !self.version_would_conflict(package, *v))
                .collect();
            let chosen = match feasible
                .first()
                .or_else(|| unexcluded.first())
                .or_else(|| permanent_survivors.first())
                .copied()
            {
                Some(version) => version,
                // Unreachable: permanent_survivors was checked non-empty.
                None => continue,
            };
            let count = feasible.len();
            let better = match best {
                None => true,
                Some((best_pkg, _, best_count)) => {
                    count < best_count || (count == best_count && package < best_pkg)
                }
            };
            if better {
                best = Some((package, chosen, count));
            }
        }

        let (package, version, _) = match best {
            Some(best) => best,
            None => return Ok(DecideOutcome::Done),
        };

        self.stats.decisions += 1;
        if self.stats.decisions > PG_MAX_DECISIONS {
            return Err(SolveError::CapExceeded("decisions"));
        }
        self.current_level += 1;
        log::debug!(
            "decision {:?} = {} at level {}",
            package,
            version,
            self.current_level
        );
        self.push_assignment(Assignment {
            package,
            range: Range::exact(version),
            positive: true,
            decided: true,
            decision_level: self.current_level,
            cause: None,
        })?;
        let deps = self.provider.dependencies(package, version)?;
        for (dependency, required) in deps {
            let incompat = Incompatibility::from_dependency(
                package,
                Range::exact(version),
                dependency,
                required,
            );
            let id = self.alloc_incompat(incompat)?;
            self.attach(id);
        }
        Ok(DecideOutcome::Decided)
    }

    /// Look-ahead pre-filter: would deciding `version` immediately
    /// satisfy one of the package's currently unsatisfied
    /// incompatibilities?
    fn version_would_conflict(&self, package: PackageId, version: Version) -> bool {
        let candidate = Range::exact(version);
        let state = &self.pkg_states[package.index()];
        for &id in &self.pkg_incompats[package.index()] {
            let incompat = self.store.get(id);
            let all_satisfied = incompat.terms.iter().all(|term| {
                let term_state = if term.package == package {
                    state.derived.term_state_with(term, candidate)
                } else {
                    self.term_state(term)
                };
                term_state == TermState::Satisfied
            });
            if all_satisfied {
                return true;
            }
        }
        false
    }

    // Conflict resolution #####################################################

    /// Classic conflict-driven clause learning on the PubGrub
    /// formulation, implemented iteratively.
    ///
    /// `nv_versions` is the known version list of the package of a
    /// no-versions conflict, used by the satisfier search of that
    /// incompatibility; empty for ordinary conflicts.
    fn resolve_conflict(
        &mut self,
        conflict: IncompatId,
        nv_versions: &[Version],
    ) -> Result<Resolution, SolveError> {
        let mut current = conflict;
        loop {
            if self.store.get(current).is_terminal() {
                return Ok(Resolution::NoSolution(current));
            }
            let nv_ctx = if current == conflict && !nv_versions.is_empty() {
                Some(nv_versions)
            } else {
                None
            };
            let search = match self.satisfier_search(current, nv_ctx) {
                Some(search) => search,
                None => return Err(SolveError::CapExceeded("satisfier search")),
            };
            let satisfier = self.trail[search.index];
            let package = search.term.package;
            if satisfier.decided || search.previous_level != satisfier.decision_level {
                return Ok(Resolution::Backjump {
                    learned: current,
                    level: search.previous_level,
                });
            }
            let cause = match satisfier.cause {
                Some(cause) => cause,
                None => {
                    // The satisfier is a root dependency fact: the
                    // conflict holds under the project constraints alone.
                    return Ok(Resolution::NoSolution(
                        self.root_failure(current, package, search.term)?,
                    ));
                }
            };
            current = self.store.resolve(current, cause, package);
            self.stats.learned += 1;
            if self.store.len() > PG_MAX_INCOMPATIBILITIES {
                return Err(SolveError::CapExceeded("incompatibilities"));
            }
        }
    }

    /// Derive the stored root incompatibility when a conflict is pinned
    /// by a root dependency fact: drop the satisfied term and chain the
    /// causes to the matching root dependency incompatibility.
    fn root_failure(
        &mut self,
        current: IncompatId,
        package: PackageId,
        dropped: Term,
    ) -> Result<IncompatId, SolveError> {
        let root_cause = self.pkg_incompats[package.index()]
            .iter()
            .copied()
            .find(|&id| self.store.get(id).reason == Reason::Root);
        let root_cause = match root_cause {
            Some(id) => id,
            None => return Ok(current),
        };
        let terms: Vec<Term> = self
            .store
            .get(current)
            .terms
            .iter()
            .copied()
            .filter(|t| *t != dropped)
            .collect();
        self.alloc_incompat(Incompatibility {
            terms,
            reason: Reason::Internal,
            causes: Some((current, root_cause)),
            attached: false,
        })
    }

    // Satisfier search ########################################################

    /// Scan the trail, tracking for every term of the incompatibility
    /// the earliest index at which it becomes satisfied. The satisfier
    /// is the assignment completing the last term; the previous level is
    /// the highest level among assignments satisfying the other terms.
    ///
    /// For a no-versions conflict, the positive term is considered
    /// satisfied as soon as the accumulated assignments leave no
    /// surviving version, so exclusions chain to their causes.
    fn satisfier_search(
        &self,
        current: IncompatId,
        nv_versions: Option<&[Version]>,
    ) -> Option<SatisfierSearch> {
        let incompat = self.store.get(current);
        let mut acc: Vec<(PackageId, PkgAssignments)> = Vec::new();
        let mut satisfied_at: Vec<Option<usize>> = vec![None; incompat.terms.len()];
        for (index, assignment) in self.trail.iter().enumerate() {
            match acc.iter_mut().find(|(p, _)| *p == assignment.package) {
                Some((_, assignments)) => {
                    assignments.record(assignment.range, assignment.positive)
                }
                None => {
                    let mut assignments = PkgAssignments::default();
                    assignments.record(assignment.range, assignment.positive);
                    acc.push((assignment.package, assignments));
                }
            }
            for (term_index, term) in incompat.terms.iter().enumerate() {
                if satisfied_at[term_index].is_some() || term.package != assignment.package {
                    continue;
                }
                let pkg_acc = acc
                    .iter()
                    .find(|(p, _)| *p == term.package)
                    .map(|(_, a)| a);
                let satisfied = match (nv_versions, pkg_acc) {
                    (Some(versions), Some(pkg_acc)) => {
                        no_version_survives(versions, &term.range, pkg_acc)
                    }
                    (None, Some(pkg_acc)) => pkg_acc.term_state(term) == TermState::Satisfied,
                    (_, None) => false,
                };
                if satisfied {
                    satisfied_at[term_index] = Some(index);
                }
            }
            if satisfied_at.iter().all(|s| s.is_some()) {
                break;
            }
        }
        if satisfied_at.iter().any(|s| s.is_none()) {
            debug_assert!(false, "conflicting incompatibility must be satisfied");
            return None;
        }
        let (satisfier_term_index, satisfier_index) = satisfied_at
            .iter()
            .enumerate()
            .map(|(t, s)| (t, s.unwrap_or(0)))
            .max_by_key(|&(_, s)| s)?;
        let term = incompat.terms[satisfier_term_index];
        let previous_level = satisfied_at
            .iter()
            .enumerate()
            .filter(|(t, _)| incompat.terms[*t].package != term.package)
            .filter_map(|(_, s)| s.map(|index| self.trail[index].decision_level))
            .max()
            .unwrap_or(0);
        Some(SatisfierSearch {
            index: satisfier_index,
            term,
            previous_level,
        })
    }

    // Backjump ################################################################

    /// Truncate the trail above the target level, rebuild the package
    /// states from the surviving assignments, and re-enqueue their
    /// packages so propagation rescans against learned
    /// incompatibilities.
    fn backtrack_to(&mut self, target: u32) {
        let keep = self
            .trail
            .iter()
            .position(|a| a.decision_level > target)
            .unwrap_or(self.trail.len());
        self.trail.truncate(keep);
        for state in &mut self.pkg_states {
            state.has_decision = false;
            state.decision_version = None;
            state.derived = PkgAssignments::default();
        }
        for index in 0..self.trail.len() {
            let assignment = self.trail[index];
            let state = &mut self.pkg_states[assignment.package.index()];
            state.derived.record(assignment.range, assignment.positive);
            if assignment.decided {
                state.has_decision = true;
                state.decision_version = assignment.range.as_exact();
            }
        }
        self.current_level = target;
        self.changed.clear();
        let packages: Vec<PackageId> = self.trail.iter().map(|a| a.package).collect();
        for package in packages {
            self.enqueue(package);
        }
    }

    // Bookkeeping #############################################################

    fn push_assignment(&mut self, assignment: Assignment) -> Result<(), SolveError> {
        if self.trail.len() >= PG_MAX_TRAIL_ASSIGNMENTS {
            return Err(SolveError::CapExceeded("trail"));
        }
        self.ensure_package(assignment.package);
        let state = &mut self.pkg_states[assignment.package.index()];
        state.used = true;
        state.derived.record(assignment.range, assignment.positive);
        if assignment.decided {
            state.has_decision = true;
            state.decision_version = assignment.range.as_exact();
        }
        self.trail.push(assignment);
        self.enqueue(assignment.package);
        Ok(())
    }

    fn alloc_incompat(&mut self, incompat: Incompatibility) -> Result<IncompatId, SolveError> {
        if self.store.len() >= PG_MAX_INCOMPATIBILITIES {
            return Err(SolveError::CapExceeded("incompatibilities"));
        }
        Ok(self.store.alloc(incompat))
    }

    /// Register an incompatibility in the watch list of every package
    /// it names. Idempotent.
    fn attach(&mut self, id: IncompatId) {
        if self.store.get(id).attached {
            return;
        }
        let packages: Vec<PackageId> = self.store.get(id).packages().collect();
        for package in packages {
            self.ensure_package(package);
            self.pkg_states[package.index()].used = true;
            self.pkg_incompats[package.index()].push(id);
        }
        self.store.get_mut(id).attached = true;
    }

    fn ensure_package(&mut self, package: PackageId) {
        let index = package.index();
        if index >= self.pkg_states.len() {
            self.pkg_states.resize_with(index + 1, PkgState::default);
            self.pkg_incompats.resize_with(index + 1, Vec::new);
        }
    }

    fn enqueue(&mut self, package: PackageId) {
        if !self.changed.contains(&package) {
            self.changed.push(package);
        }
    }

    // Outcomes ################################################################

    fn success(&self) -> SolveOutcome {
        let mut solution = BTreeMap::new();
        for (index, state) in self.pkg_states.iter().enumerate() {
            let package = PackageId(index as u32);
            if package == PackageId::ROOT {
                continue;
            }
            if let (true, Some(version)) = (state.has_decision, state.decision_version) {
                solution.insert(self.provider.name_of(package).clone(), version);
            }
        }
        SolveOutcome::Solution(solution)
    }

    fn failure(&self, root: IncompatId) -> SolveOutcome {
        let explanation =
            report::explain(&self.store, root, &|p| self.provider.name_of(p).clone());
        SolveOutcome::NoSolution { explanation }
    }
}

/// True when no version of the list survives the accumulated
/// assignments inside the given range.
fn no_version_survives(versions: &[Version], range: &Range, acc: &PkgAssignments) -> bool {
    if acc.positive.is_none() {
        return false;
    }
    let positive = acc.positive_or_any();
    !versions.iter().any(|v| {
        range.contains(*v) && positive.contains(*v) && !acc.negatives.iter().any(|n| n.contains(*v))
    })
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::provider::StaticProvider;
    use super::*;

    fn v(major: u32, minor: u32, patch: u32) -> Version {
        Version::new(major, minor, patch)
    }

    fn pkg(name: &str) -> Pkg {
        Pkg::new("a", name)
    }

    fn solve(provider: &mut StaticProvider) -> SolveOutcome {
        Solver::new(provider).solve().unwrap()
    }

    fn expect_solution(outcome: SolveOutcome) -> BTreeMap<Pkg, Version> {
        match outcome {
            SolveOutcome::Solution(solution) => solution,
            SolveOutcome::NoSolution { explanation } => {
                panic!("expected a solution, got:\n{}", explanation)
            }
        }
    }

    fn expect_failure(outcome: SolveOutcome) -> String {
        match outcome {
            SolveOutcome::NoSolution { explanation } => explanation,
            SolveOutcome::Solution(solution) => {
                panic!("expected no solution, got {:?}", solution)
            }
        }
    }

    #[test]
    fn single_dependency_chain() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("core"), v(1, 0, 0), vec![]);
        provider.add_version(
            pkg("html"),
            v(1, 0, 0),
            vec![(pkg("core"), Range::between(v(1, 0, 0), v(2, 0, 0)))],
        );
        provider.set_root_dependencies(vec![(pkg("html"), Range::any())]);
        let solution = expect_solution(solve(&mut provider));
        assert_eq!(solution.get(&pkg("html")), Some(&v(1, 0, 0)));
        assert_eq!(solution.get(&pkg("core")), Some(&v(1, 0, 0)));
        assert_eq!(solution.len(), 2);
    }

    #[test]
    fn newest_version_is_preferred() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("core"), v(1, 0, 0), vec![]);
        provider.add_version(pkg("core"), v(1, 0, 5), vec![]);
        provider.add_version(pkg("core"), v(2, 0, 0), vec![]);
        provider.set_root_dependencies(vec![(
            pkg("core"),
            Range::between(v(1, 0, 0), v(2, 0, 0)),
        )]);
        let solution = expect_solution(solve(&mut provider));
        assert_eq!(solution.get(&pkg("core")), Some(&v(1, 0, 5)));
    }

    #[test]
    fn shared_dependency_narrowed_by_two_dependers() {
        let mut provider = StaticProvider::new();
        for patch in 0..4 {
            provider.add_version(pkg("shared"), v(1, 0, patch), vec![]);
        }
        provider.add_version(
            pkg("left"),
            v(1, 0, 0),
            vec![(pkg("shared"), Range::between(v(1, 0, 0), v(1, 0, 2)))],
        );
        provider.add_version(
            pkg("right"),
            v(1, 0, 0),
            vec![(pkg("shared"), Range::between(v(1, 0, 1), v(2, 0, 0)))],
        );
        provider.set_root_dependencies(vec![
            (pkg("left"), Range::any()),
            (pkg("right"), Range::any()),
        ]);
        let solution = expect_solution(solve(&mut provider));
        // Only 1.0.1 satisfies both dependers.
        assert_eq!(solution.get(&pkg("shared")), Some(&v(1, 0, 1)));
    }

    #[test]
    fn backtracks_to_older_version_on_conflict() {
        // foo 1.1.0 pulls in bar, which requires a baz the root
        // constraint forbids; foo 1.0.0 has no dependencies, so the
        // solver must back off to foo 1.0.0.
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("baz"), v(1, 0, 0), vec![]);
        provider.add_version(pkg("baz"), v(2, 0, 0), vec![]);
        provider.add_version(
            pkg("bar"),
            v(1, 0, 0),
            vec![(pkg("baz"), Range::between(v(2, 0, 0), v(3, 0, 0)))],
        );
        provider.add_version(pkg("foo"), v(1, 0, 0), vec![]);
        provider.add_version(
            pkg("foo"),
            v(1, 1, 0),
            vec![(pkg("bar"), Range::between(v(1, 0, 0), v(2, 0, 0)))],
        );
        provider.set_root_dependencies(vec![
            (pkg("foo"), Range::any()),
            (pkg("baz"), Range::between(v(1, 0, 0), v(2, 0, 0))),
        ]);
        let solution = expect_solution(solve(&mut provider));
        assert_eq!(solution.get(&pkg("foo")), Some(&v(1, 0, 0)));
        assert_eq!(solution.get(&pkg("baz")), Some(&v(1, 0, 0)));
        assert_eq!(solution.get(&pkg("bar")), None);
    }

    #[test]
    fn missing_version_is_explained() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("y"), v(1, 0, 0), vec![]);
        provider.add_version(
            pkg("x"),
            v(1, 0, 0),
            vec![(pkg("y"), Range::between(v(2, 0, 0), v(3, 0, 0)))],
        );
        provider.set_root_dependencies(vec![(pkg("x"), Range::any())]);
        let explanation = expect_failure(solve(&mut provider));
        assert!(explanation.contains("a/x"), "{}", explanation);
        assert!(explanation.contains("depends on a/y"), "{}", explanation);
        assert!(
            explanation.contains("no versions of a/y satisfy"),
            "{}",
            explanation
        );
        assert!(
            explanation.contains("version solving failed"),
            "{}",
            explanation
        );
    }

    #[test]
    fn unknown_package_means_no_versions() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("x"), v(1, 0, 0), vec![(pkg("ghost"), Range::any())]);
        provider.set_root_dependencies(vec![(pkg("x"), Range::any())]);
        let explanation = expect_failure(solve(&mut provider));
        assert!(explanation.contains("a/ghost"), "{}", explanation);
    }

    #[test]
    fn determinism_on_repeated_runs() {
        let build = || {
            let mut provider = StaticProvider::new();
            for minor in 0..3 {
                provider.add_version(pkg("m"), v(1, minor, 0), vec![]);
                provider.add_version(
                    pkg("n"),
                    v(1, minor, 0),
                    vec![(pkg("m"), Range::until_next_major(v(1, 0, 0)))],
                );
            }
            provider.set_root_dependencies(vec![
                (pkg("n"), Range::any()),
                (pkg("m"), Range::any()),
            ]);
            provider
        };
        let first = expect_solution(solve(&mut build()));
        for _ in 0..3 {
            assert_eq!(expect_solution(solve(&mut build())), first);
        }
    }

    #[test]
    fn exact_root_constraints_are_conservative() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("core"), v(1, 0, 0), vec![]);
        provider.add_version(pkg("core"), v(1, 0, 5), vec![]);
        provider.set_root_dependencies(vec![(pkg("core"), Range::exact(v(1, 0, 0)))]);
        let solution = expect_solution(solve(&mut provider));
        // The pinned version wins even though a newer one exists.
        assert_eq!(solution.get(&pkg("core")), Some(&v(1, 0, 0)));
    }

    #[test]
    fn conflicting_root_pins_fail() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("dep"), v(1, 0, 0), vec![]);
        provider.add_version(pkg("dep"), v(2, 0, 0), vec![]);
        provider.add_version(
            pkg("app"),
            v(1, 0, 0),
            vec![(pkg("dep"), Range::between(v(2, 0, 0), v(3, 0, 0)))],
        );
        provider.set_root_dependencies(vec![
            (pkg("app"), Range::any()),
            (pkg("dep"), Range::exact(v(1, 0, 0))),
        ]);
        let explanation = expect_failure(solve(&mut provider));
        assert!(
            explanation.contains("version solving failed"),
            "{}",
            explanation
        );
    }

    #[test]
    fn solution_satisfies_every_dependency_range() {
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("json"), v(1, 1, 3), vec![]);
        provider.add_version(
            pkg("http"),
            v(2, 0, 0),
            vec![(pkg("json"), Range::until_next_major(v(1, 0, 0)))],
        );
        provider.add_version(
            pkg("app-kit"),
            v(3, 1, 0),
            vec![
                (pkg("http"), Range::until_next_major(v(2, 0, 0))),
                (pkg("json"), Range::until_next_major(v(1, 1, 0))),
            ],
        );
        provider.set_root_dependencies(vec![(pkg("app-kit"), Range::any())]);
        let solution = expect_solution(solve(&mut provider));
        assert_eq!(solution.get(&pkg("app-kit")), Some(&v(3, 1, 0)));
        assert_eq!(solution.get(&pkg("http")), Some(&v(2, 0, 0)));
        assert_eq!(solution.get(&pkg("json")), Some(&v(1, 1, 3)));
    }

    #[test]
    fn deep_backtracking_across_shared_constraints() {
        // Newer versions of both chains fight over the shared package;
        // only older picks agree on shared 1.0.0.
        let mut provider = StaticProvider::new();
        provider.add_version(pkg("shared"), v(1, 0, 0), vec![]);
        provider.add_version(pkg("shared"), v(2, 0, 0), vec![]);
        provider.add_version(
            pkg("chain-a"),
            v(1, 0, 0),
            vec![(pkg("shared"), Range::until_next_major(v(1, 0, 0)))],
        );
        provider.add_version(
            pkg("chain-a"),
            v(2, 0, 0),
            vec![(pkg("shared"), Range::until_next_major(v(2, 0, 0)))],
        );
        provider.add_version(
            pkg("chain-b"),
            v(1, 0, 0),
            vec![(pkg("shared"), Range::until_next_major(v(1, 0, 0)))],
        );
        provider.set_root_dependencies(vec![
            (pkg("chain-a"), Range::any()),
            (pkg("chain-b"), Range::any()),
        ]);
        let solution = expect_solution(solve(&mut provider));
        assert_eq!(solution.get(&pkg("chain-a")), Some(&v(1, 0, 0)));
        assert_eq!(solution.get(&pkg("chain-b")), Some(&v(1, 0, 0)));
        assert_eq!(solution.get(&pkg("shared")), Some(&v(1, 0, 0)));
    }
}
