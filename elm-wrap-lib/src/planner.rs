// SPDX-License-Identifier: MPL-2.0

//! Strategy-driven install planner.
//!
//! A strategy translates the project's current dependency maps into the
//! root constraints fed to the solver. The solved assignment is then
//! diffed against the current `elm.json` to produce an ordered install
//! plan of adds, upgrades, downgrades and removals, and a rewritten
//! project config.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::cache::PackageCache;
use crate::fetch::{Downloader, FetchError};
use crate::project_config::{ApplicationConfig, Pkg, ProjectConfig};
use crate::registry::Registry;
use crate::solver::provider::{DependencyProvider, ElmProvider};
use crate::solver::{SolveError, SolveOutcome, Solver};
use crate::transport::Transport;
use crate::version::{Bound, Range, Version};

/// How current versions contribute root constraints to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every dependency map pinned exactly. Minimal churn.
    ExactAll,
    /// Direct and test maps pinned, indirect upgradable within major.
    /// The default install strategy.
    ExactDirectUpgradableIndirect,
    /// Every map upgradable within its current major.
    UpgradableWithinMajor,
    /// Direct and indirect unconstrained, test maps pinned.
    /// Allows a major upgrade of the requested package.
    CrossMajorForTarget,
}

impl Strategy {
    /// The cascade tried by upgrade flows, strictest first.
    pub fn cascade() -> [Strategy; 4] {
        [
            Strategy::ExactAll,
            Strategy::ExactDirectUpgradableIndirect,
            Strategy::UpgradableWithinMajor,
            Strategy::CrossMajorForTarget,
        ]
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::ExactAll => "exact-all",
            Strategy::ExactDirectUpgradableIndirect => "exact-direct-upgradable-indirect",
            Strategy::UpgradableWithinMajor => "upgradable-within-major",
            Strategy::CrossMajorForTarget => "cross-major-for-target",
        };
        f.write_str(name)
    }
}

/// One entry of an install plan. At least one of the versions is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    /// The package changing.
    pub pkg: Pkg,
    /// Version currently locked, absent for an add.
    pub old_version: Option<Version>,
    /// Version selected by the solver, absent for a removal.
    pub new_version: Option<Version>,
}

impl PackageChange {
    /// The package was not in the lock before.
    pub fn is_add(&self) -> bool {
        self.old_version.is_none()
    }

    /// The package leaves the lock.
    pub fn is_remove(&self) -> bool {
        self.new_version.is_none()
    }
}

impl fmt::Display for PackageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.old_version, self.new_version) {
            (None, Some(new)) => write!(f, "+ {} {}", self.pkg, new),
            (Some(old), None) => write!(f, "- {} {}", self.pkg, old),
            (Some(old), Some(new)) => write!(f, "{} {} -> {}", self.pkg, old, new),
            (None, None) => write!(f, "{}", self.pkg),
        }
    }
}

/// Ordered list of package changes, sorted by (author, name).
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    /// The changes, in deterministic order.
    pub changes: Vec<PackageChange>,
}

impl InstallPlan {
    /// Whether the plan changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for InstallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "nothing to change");
        }
        for (index, change) in self.changes.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", change)?;
        }
        Ok(())
    }
}

/// Result of a successful planning run.
#[derive(Debug)]
pub struct PlanOutcome {
    /// The diff against the current lock.
    pub plan: InstallPlan,
    /// The full solved assignment.
    pub solution: BTreeMap<Pkg, Version>,
    /// The strategy that produced the solution.
    pub strategy: Strategy,
    /// The project config rewritten with the solved versions.
    pub updated_config: ProjectConfig,
}

/// A requested package, optionally pinned to one version.
#[derive(Debug, Clone)]
pub struct Request {
    /// The package to install or upgrade.
    pub pkg: Pkg,
    /// An explicit version, forcing an exact root constraint.
    pub version: Option<Version>,
}

/// Error type for the planner.
#[derive(Error, Debug)]
pub enum PlanError {
    /// The requested package is not in the registry.
    #[error("package {0} is not in the registry")]
    UnknownPackage(Pkg),

    /// The requested package is not a direct dependency (for removals).
    #[error("package {0} is not a direct dependency of this project")]
    NotADirectDependency(Pkg),

    /// Every strategy of the cascade failed; the narrative explains the
    /// most permissive attempt.
    #[error("version solving failed:\n{explanation}")]
    NoSolution {
        /// Numbered narrative from the solver.
        explanation: String,
    },

    /// The solver aborted.
    #[error(transparent)]
    Solver(#[from] SolveError),
}

/// Everything a planning run needs to query the package world.
pub struct PlannerContext<'a> {
    /// The loaded registry index.
    pub registry: &'a Registry,
    /// The package cache, when available, for dependency lookups.
    pub cache: Option<&'a PackageCache>,
    /// The compiler version packages must be compatible with.
    pub compiler_version: Version,
}

/// Solve the project under a single named strategy.
pub fn solve_with_strategy(
    config: &ProjectConfig,
    request: Option<&Request>,
    strategy: Strategy,
    ctx: &PlannerContext<'_>,
) -> Result<SolveOutcome, PlanError> {
    let constraints = root_constraints(config, request, strategy);
    let mut provider = ElmProvider::new(ctx.registry, ctx.cache, ctx.compiler_version);
    let root_deps: Vec<_> = constraints
        .iter()
        .map(|(pkg, range)| (provider.intern(pkg), *range))
        .collect();
    provider.set_root_dependencies(root_deps);
    log::info!("solving with strategy {}", strategy);
    Ok(Solver::new(&mut provider).solve()?)
}

/// Plan the installation of a package (or of the whole current lock)
/// by running the strategy cascade, stopping at the first success.
pub fn plan_install(
    config: &ProjectConfig,
    request: Option<&Request>,
    ctx: &PlannerContext<'_>,
) -> Result<PlanOutcome, PlanError> {
    if let Some(request) = request {
        if ctx.registry.find(&request.pkg).is_none() {
            return Err(PlanError::UnknownPackage(request.pkg.clone()));
        }
    }
    let mut last_explanation = None;
    for strategy in Strategy::cascade() {
        match solve_with_strategy(config, request, strategy, ctx)? {
            SolveOutcome::Solution(solution) => {
                return Ok(build_outcome(config, request, strategy, solution));
            }
            SolveOutcome::NoSolution { explanation } => {
                log::info!("strategy {} found no solution", strategy);
                last_explanation = Some(explanation);
            }
        }
    }
    Err(PlanError::NoSolution {
        explanation: last_explanation.unwrap_or_default(),
    })
}

/// Plan an upgrade of the whole project.
///
/// Minor upgrades stay within each major series; `cross_major` lifts
/// the direct and indirect constraints entirely.
pub fn plan_upgrade(
    config: &ProjectConfig,
    cross_major: bool,
    ctx: &PlannerContext<'_>,
) -> Result<PlanOutcome, PlanError> {
    let strategy = if cross_major {
        Strategy::CrossMajorForTarget
    } else {
        Strategy::UpgradableWithinMajor
    };
    match solve_with_strategy(config, None, strategy, ctx)? {
        SolveOutcome::Solution(solution) => Ok(build_outcome(config, None, strategy, solution)),
        SolveOutcome::NoSolution { explanation } => Err(PlanError::NoSolution { explanation }),
    }
}

/// Plan the removal of a direct dependency. No solver involved, and
/// orphaned indirect dependencies are deliberately not pruned.
pub fn plan_remove(config: &ProjectConfig, pkg: &Pkg) -> Result<PlanOutcome, PlanError> {
    match config {
        ProjectConfig::Application(app) => {
            let old_version = app
                .dependencies
                .direct
                .get(pkg)
                .or_else(|| app.test_dependencies.direct.get(pkg))
                .copied()
                .ok_or_else(|| PlanError::NotADirectDependency(pkg.clone()))?;
            let mut updated = app.clone();
            updated.dependencies.direct.remove(pkg);
            updated.test_dependencies.direct.remove(pkg);
            let solution = updated
                .all_dependencies()
                .map(|(p, v)| (p.clone(), *v))
                .collect();
            Ok(PlanOutcome {
                plan: InstallPlan {
                    changes: vec![PackageChange {
                        pkg: pkg.clone(),
                        old_version: Some(old_version),
                        new_version: None,
                    }],
                },
                solution,
                strategy: Strategy::ExactAll,
                updated_config: ProjectConfig::Application(updated),
            })
        }
        ProjectConfig::Package(package) => {
            let constraint = package
                .dependencies
                .get(pkg)
                .or_else(|| package.test_dependencies.get(pkg))
                .cloned()
                .ok_or_else(|| PlanError::NotADirectDependency(pkg.clone()))?;
            // A package project locks no version; the constraint's lower
            // bound stands in so the change still reads as a removal.
            let old_version = match constraint.0.lower() {
                Bound::Inclusive(v) | Bound::Exclusive(v) => v,
                Bound::Unbounded => Version::zero(),
            };
            let mut updated = package.clone();
            updated.dependencies.remove(pkg);
            updated.test_dependencies.remove(pkg);
            Ok(PlanOutcome {
                plan: InstallPlan {
                    changes: vec![PackageChange {
                        pkg: pkg.clone(),
                        old_version: Some(old_version),
                        new_version: None,
                    }],
                },
                solution: BTreeMap::new(),
                strategy: Strategy::ExactAll,
                updated_config: ProjectConfig::Package(updated),
            })
        }
    }
}

/// Fetch every added or changed package of a plan that is not already
/// fully downloaded.
pub fn fetch_changes<T: Transport>(
    plan: &InstallPlan,
    downloader: &Downloader<'_, T>,
) -> Result<(), FetchError> {
    for change in &plan.changes {
        if let Some(version) = change.new_version {
            downloader.fetch(&crate::pkg_version::PkgVersion::new(
                change.pkg.clone(),
                version,
            ))?;
        }
    }
    Ok(())
}

// Internals ###################################################################

/// Build the list of root constraints for one strategy.
///
/// For `CrossMajorForTarget` the requested package comes first, so its
/// identifier is interned before transitive constraints tighten it.
fn root_constraints(
    config: &ProjectConfig,
    request: Option<&Request>,
    strategy: Strategy,
) -> Vec<(Pkg, Range)> {
    let mut constraints: Vec<(Pkg, Range)> = Vec::new();
    let request_constraint = request.map(|r| {
        let range = match r.version {
            Some(v) => Range::exact(v),
            None => Range::any(),
        };
        (r.pkg.clone(), range)
    });
    let cross_major = strategy == Strategy::CrossMajorForTarget;
    if cross_major {
        if let Some(constraint) = request_constraint.clone() {
            constraints.push(constraint);
        }
    }
    match config {
        ProjectConfig::Application(app) => {
            let exact = |v: &Version| Range::exact(*v);
            let within_major = |v: &Version| Range::until_next_major(*v);
            let unconstrained = |_: &Version| Range::any();
            let (direct, indirect): (fn(&Version) -> Range, fn(&Version) -> Range) =
                match strategy {
                    Strategy::ExactAll => (exact, exact),
                    Strategy::ExactDirectUpgradableIndirect => (exact, within_major),
                    Strategy::UpgradableWithinMajor => (within_major, within_major),
                    // Unconstrained, not absent: the packages stay in
                    // the solution at whatever version fits.
                    Strategy::CrossMajorForTarget => (unconstrained, unconstrained),
                };
            for (pkg, version) in &app.dependencies.direct {
                constraints.push((pkg.clone(), direct(version)));
            }
            for (pkg, version) in &app.dependencies.indirect {
                constraints.push((pkg.clone(), indirect(version)));
            }
            let test: fn(&Version) -> Range = match strategy {
                Strategy::UpgradableWithinMajor => within_major,
                _ => exact,
            };
            for (pkg, version) in &app.test_dependencies.direct {
                constraints.push((pkg.clone(), test(version)));
            }
            for (pkg, version) in &app.test_dependencies.indirect {
                constraints.push((pkg.clone(), test(version)));
            }
        }
        ProjectConfig::Package(package) => {
            for (pkg, constraint) in &package.dependencies {
                constraints.push((pkg.clone(), constraint.0));
            }
            for (pkg, constraint) in &package.test_dependencies {
                constraints.push((pkg.clone(), constraint.0));
            }
        }
    }
    if !cross_major {
        if let Some(constraint) = request_constraint {
            constraints.push(constraint);
        }
    }
    constraints
}

fn build_outcome(
    config: &ProjectConfig,
    request: Option<&Request>,
    strategy: Strategy,
    solution: BTreeMap<Pkg, Version>,
) -> PlanOutcome {
    let locked: BTreeMap<Pkg, Version> = match config {
        ProjectConfig::Application(app) => app
            .all_dependencies()
            .map(|(pkg, version)| (pkg.clone(), *version))
            .collect(),
        ProjectConfig::Package(_) => BTreeMap::new(),
    };
    let mut changes = Vec::new();
    for (pkg, &new_version) in &solution {
        match locked.get(pkg) {
            Some(&old) if old == new_version => {}
            Some(&old) => changes.push(PackageChange {
                pkg: pkg.clone(),
                old_version: Some(old),
                new_version: Some(new_version),
            }),
            None => changes.push(PackageChange {
                pkg: pkg.clone(),
                old_version: None,
                new_version: Some(new_version),
            }),
        }
    }
    for (pkg, &old) in &locked {
        if !solution.contains_key(pkg) {
            changes.push(PackageChange {
                pkg: pkg.clone(),
                old_version: Some(old),
                new_version: None,
            });
        }
    }
    changes.sort_by(|a, b| a.pkg.cmp(&b.pkg));
    let updated_config = rewrite_config(config, request, &solution);
    PlanOutcome {
        plan: InstallPlan { changes },
        solution,
        strategy,
        updated_config,
    }
}

/// Rewrite the project config with the solved versions, preserving the
/// direct/indirect and test splits. New packages join the direct map
/// when requested, the indirect map otherwise.
fn rewrite_config(
    config: &ProjectConfig,
    request: Option<&Request>,
    solution: &BTreeMap<Pkg, Version>,
) -> ProjectConfig {
    match config {
        ProjectConfig::Application(app) => {
            let mut updated = ApplicationConfig {
                source_directories: app.source_directories.clone(),
                elm_version: app.elm_version,
                dependencies: Default::default(),
                test_dependencies: Default::default(),
            };
            for (pkg, &version) in solution {
                if app.dependencies.direct.contains_key(pkg) {
                    updated.dependencies.direct.insert(pkg.clone(), version);
                } else if app.test_dependencies.direct.contains_key(pkg) {
                    updated
                        .test_dependencies
                        .direct
                        .insert(pkg.clone(), version);
                } else if app.test_dependencies.indirect.contains_key(pkg) {
                    updated
                        .test_dependencies
                        .indirect
                        .insert(pkg.clone(), version);
                } else if request.map(|r| &r.pkg == pkg).unwrap_or(false) {
                    updated.dependencies.direct.insert(pkg.clone(), version);
                } else {
                    updated.dependencies.indirect.insert(pkg.clone(), version);
                }
            }
            ProjectConfig::Application(updated)
        }
        ProjectConfig::Package(package) => {
            let mut updated = package.clone();
            if let Some(request) = request {
                if let Some(&version) = solution.get(&request.pkg) {
                    updated.dependencies.entry(request.pkg.clone()).or_insert(
                        crate::constraint::Constraint::until_next_major(version),
                    );
                }
            }
            ProjectConfig::Package(updated)
        }
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32, patch: u32) -> Version {
        Version::new(major, minor, patch)
    }

    fn registry_with_deps(text: &str) -> Registry {
        Registry::from_text_index(text).unwrap()
    }

    fn empty_app() -> ProjectConfig {
        serde_json::from_str(
            r#"{
                "type": "application",
                "source-directories": ["src"],
                "elm-version": "0.19.1",
                "dependencies": { "direct": {}, "indirect": {} },
                "test-dependencies": { "direct": {}, "indirect": {} }
            }"#,
        )
        .unwrap()
    }

    fn app_with_lock(direct: &[(&str, &str)], indirect: &[(&str, &str)]) -> ProjectConfig {
        let to_map = |entries: &[(&str, &str)]| {
            entries
                .iter()
                .map(|(p, v)| format!("\"{}\": \"{}\"", p, v))
                .collect::<Vec<_>>()
                .join(", ")
        };
        serde_json::from_str(&format!(
            r#"{{
                "type": "application",
                "source-directories": ["src"],
                "elm-version": "0.19.1",
                "dependencies": {{ "direct": {{ {} }}, "indirect": {{ {} }} }},
                "test-dependencies": {{ "direct": {{}}, "indirect": {{}} }}
            }}"#,
            to_map(direct),
            to_map(indirect)
        ))
        .unwrap()
    }

    fn ctx(registry: &Registry) -> PlannerContext<'_> {
        PlannerContext {
            registry,
            cache: None,
            compiler_version: v(0, 19, 1),
        }
    }

    #[test]
    fn simple_add_under_exact_all() {
        let registry = registry_with_deps(
            "2\n\
             elm/core@1.0.0\n\
             elm/html@1.0.0\telm/core:1.0.0 <= v < 2.0.0\n",
        );
        let config = empty_app();
        let request = Request {
            pkg: Pkg::new("elm", "html"),
            version: None,
        };
        let outcome = plan_install(&config, Some(&request), &ctx(&registry)).unwrap();
        assert_eq!(outcome.strategy, Strategy::ExactAll);
        let rendered: Vec<String> =
            outcome.plan.changes.iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered, vec!["+ elm/core 1.0.0", "+ elm/html 1.0.0"]);
        match outcome.updated_config {
            ProjectConfig::Application(app) => {
                assert!(app.dependencies.direct.contains_key(&Pkg::new("elm", "html")));
                assert!(app
                    .dependencies
                    .indirect
                    .contains_key(&Pkg::new("elm", "core")));
            }
            ProjectConfig::Package(_) => panic!("expected application"),
        }
    }

    #[test]
    fn install_is_idempotent_for_locked_version() {
        let registry = registry_with_deps("2\nelm/core@1.0.0\nelm/core@1.0.5\n");
        let config = app_with_lock(&[("elm/core", "1.0.0")], &[]);
        let request = Request {
            pkg: Pkg::new("elm", "core"),
            version: None,
        };
        let outcome = plan_install(&config, Some(&request), &ctx(&registry)).unwrap();
        assert_eq!(outcome.strategy, Strategy::ExactAll);
        assert!(outcome.plan.is_empty(), "{}", outcome.plan);
    }

    #[test]
    fn explicit_version_cascades_past_exact_all() {
        let registry = registry_with_deps("2\na/x@1.2.3\na/x@2.0.0\n");
        let config = app_with_lock(&[("a/x", "1.2.3")], &[]);
        let request = Request {
            pkg: Pkg::new("a", "x"),
            version: Some(v(2, 0, 0)),
        };
        let outcome = plan_install(&config, Some(&request), &ctx(&registry)).unwrap();
        // Exact pinning contradicts the explicit 2.0.0 request, so the
        // cascade must reach the cross-major strategy.
        assert_eq!(outcome.strategy, Strategy::CrossMajorForTarget);
        assert_eq!(
            outcome.plan.changes,
            vec![PackageChange {
                pkg: Pkg::new("a", "x"),
                old_version: Some(v(1, 2, 3)),
                new_version: Some(v(2, 0, 0)),
            }]
        );
    }

    #[test]
    fn conflict_reports_narrative() {
        let registry = registry_with_deps(
            "2\n\
             a/x@1.0.0\ta/y:2.0.0 <= v < 3.0.0\n\
             a/y@1.0.0\n",
        );
        let config = empty_app();
        let request = Request {
            pkg: Pkg::new("a", "x"),
            version: None,
        };
        let err = plan_install(&config, Some(&request), &ctx(&registry)).unwrap_err();
        match err {
            PlanError::NoSolution { explanation } => {
                assert!(
                    explanation.contains("a/x 1.0.0 depends on a/y"),
                    "{}",
                    explanation
                );
                assert!(
                    explanation.contains("no versions of a/y satisfy"),
                    "{}",
                    explanation
                );
            }
            other => panic!("expected NoSolution, got {}", other),
        }
    }

    #[test]
    fn unknown_request_is_rejected_before_solving() {
        let registry = registry_with_deps("2\nelm/core@1.0.0\n");
        let config = empty_app();
        let request = Request {
            pkg: Pkg::new("no", "body"),
            version: None,
        };
        assert!(matches!(
            plan_install(&config, Some(&request), &ctx(&registry)),
            Err(PlanError::UnknownPackage(_))
        ));
    }

    #[test]
    fn upgrade_within_major_picks_newer_minor() {
        let registry = registry_with_deps("2\nelm/core@1.0.0\nelm/core@1.2.0\nelm/core@2.0.0\n");
        let config = app_with_lock(&[("elm/core", "1.0.0")], &[]);
        let outcome = plan_upgrade(&config, false, &ctx(&registry)).unwrap();
        assert_eq!(
            outcome.plan.changes,
            vec![PackageChange {
                pkg: Pkg::new("elm", "core"),
                old_version: Some(v(1, 0, 0)),
                new_version: Some(v(1, 2, 0)),
            }]
        );
    }

    #[test]
    fn cross_major_upgrade_crosses() {
        let registry = registry_with_deps("2\nelm/core@1.0.0\nelm/core@2.0.0\n");
        let config = app_with_lock(&[("elm/core", "1.0.0")], &[]);
        let outcome = plan_upgrade(&config, true, &ctx(&registry)).unwrap();
        assert_eq!(
            outcome.plan.changes,
            vec![PackageChange {
                pkg: Pkg::new("elm", "core"),
                old_version: Some(v(1, 0, 0)),
                new_version: Some(v(2, 0, 0)),
            }]
        );
    }

    #[test]
    fn remove_does_not_prune_orphans() {
        let registry = registry_with_deps("2\nelm/html@1.0.0\nelm/core@1.0.0\n");
        let _ = registry;
        let config = app_with_lock(&[("elm/html", "1.0.0")], &[("elm/core", "1.0.0")]);
        let outcome = plan_remove(&config, &Pkg::new("elm", "html")).unwrap();
        assert_eq!(outcome.plan.changes.len(), 1);
        assert!(outcome.plan.changes[0].is_remove());
        match outcome.updated_config {
            ProjectConfig::Application(app) => {
                assert!(app.dependencies.direct.is_empty());
                // The orphaned indirect dependency stays.
                assert!(app
                    .dependencies
                    .indirect
                    .contains_key(&Pkg::new("elm", "core")));
            }
            ProjectConfig::Package(_) => panic!("expected application"),
        }
    }

    #[test]
    fn remove_rejects_non_direct() {
        let config = app_with_lock(&[], &[("elm/core", "1.0.0")]);
        assert!(matches!(
            plan_remove(&config, &Pkg::new("elm", "core")),
            Err(PlanError::NotADirectDependency(_))
        ));
    }

    #[test]
    fn remove_from_package_project_reads_as_removal() {
        let config: ProjectConfig = serde_json::from_str(
            r#"{
                "type": "package",
                "name": "author/library",
                "summary": "helpers",
                "license": "BSD-3-Clause",
                "version": "2.1.0",
                "elm-version": "0.19.0 <= v < 0.20.0",
                "exposed-modules": ["Library"],
                "dependencies": { "elm/core": "1.0.0 <= v < 2.0.0" },
                "test-dependencies": {}
            }"#,
        )
        .unwrap();
        let outcome = plan_remove(&config, &Pkg::new("elm", "core")).unwrap();
        assert_eq!(outcome.plan.changes.len(), 1);
        let change = &outcome.plan.changes[0];
        assert!(change.is_remove());
        assert!(!change.is_add());
        assert_eq!(change.to_string(), "- elm/core 1.0.0");
        match outcome.updated_config {
            ProjectConfig::Package(package) => assert!(package.dependencies.is_empty()),
            ProjectConfig::Application(_) => panic!("expected a package config"),
        }
    }

    #[test]
    fn strategy_monotonicity_on_plain_install() {
        // If exact-all solves, the later strategies must as well.
        let registry = registry_with_deps(
            "2\n\
             elm/core@1.0.0\n\
             elm/core@1.1.0\n\
             elm/html@1.0.0\telm/core:1.0.0 <= v < 2.0.0\n",
        );
        let config = app_with_lock(&[("elm/html", "1.0.0")], &[("elm/core", "1.0.0")]);
        for strategy in Strategy::cascade() {
            let outcome =
                solve_with_strategy(&config, None, strategy, &ctx(&registry)).unwrap();
            assert!(
                matches!(outcome, SolveOutcome::Solution(_)),
                "strategy {} failed",
                strategy
            );
        }
    }
}
