// SPDX-License-Identifier: MPL-2.0

//! Dependency providers: the solver's only window on the package world.
//!
//! A provider answers two questions, "which versions of P exist"
//! (newest first) and "what does (P, V) depend on", and owns the
//! interner mapping author/name pairs to [PackageId]s. The solver never
//! sees package names.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::cache::{CacheError, PackageCache};
use crate::pkg_version::PkgVersion;
use crate::project_config::Pkg;
use crate::registry::Registry;
use crate::solver::term::PackageId;
use crate::version::{Range, Version};

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The dependencies of a known version could not be determined.
    #[error("dependencies of {0} are unavailable")]
    UnknownDependencies(PkgVersion),

    /// Reading a cached config failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Counters accumulated by a provider during one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Version list requests answered from the memo cache.
    pub version_cache_hits: u64,
    /// Version list requests that had to query the registry.
    pub version_cache_misses: u64,
}

/// Interner mapping (author, name) pairs to small integers, with an
/// inverse for display. The root package is pre-interned at id 0.
#[derive(Debug, Clone)]
pub struct Interner {
    ids: FxHashMap<Pkg, PackageId>,
    names: Vec<Pkg>,
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl Interner {
    /// Create an interner holding only the pre-interned root.
    pub fn new() -> Self {
        let root = Pkg::new("root", "");
        let mut ids = FxHashMap::default();
        ids.insert(root.clone(), PackageId::ROOT);
        Self {
            ids,
            names: vec![root],
        }
    }

    /// Intern a package, returning its id.
    pub fn intern(&mut self, pkg: &Pkg) -> PackageId {
        if let Some(&id) = self.ids.get(pkg) {
            return id;
        }
        let id = PackageId(self.names.len() as u32);
        self.ids.insert(pkg.clone(), id);
        self.names.push(pkg.clone());
        id
    }

    /// The package behind an id.
    pub fn name_of(&self, id: PackageId) -> &Pkg {
        &self.names[id.index()]
    }

    /// Number of interned packages, root included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether only the root is interned.
    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }
}

/// The two operations the solver consumes, plus access to the interner.
pub trait DependencyProvider {
    /// All known versions of the package, newest first.
    /// Unknown packages yield an empty list.
    fn versions(&mut self, package: PackageId) -> Result<Vec<Version>, ProviderError>;

    /// Dependencies of one version of a package, as ranges,
    /// interning packages as needed.
    fn dependencies(
        &mut self,
        package: PackageId,
        version: Version,
    ) -> Result<Vec<(PackageId, Range)>, ProviderError>;

    /// Intern a package identifier.
    fn intern(&mut self, pkg: &Pkg) -> PackageId;

    /// Display name of an interned package.
    fn name_of(&self, package: PackageId) -> &Pkg;

    /// Number of interned packages.
    fn package_count(&self) -> usize;

    /// Counters accumulated so far.
    fn stats(&self) -> ProviderStats;
}

/// Provider backed by the registry index and the package cache.
///
/// Version lists are filtered down to compiler-compatible versions and
/// memoized per [PackageId]; dependency lists are memoized per
/// (package, version). Dependencies come from the registry index when it
/// carries them, otherwise from the cached `elm.json`.
pub struct ElmProvider<'a> {
    registry: &'a Registry,
    cache: Option<&'a PackageCache>,
    compiler_version: Version,
    interner: Interner,
    cached_versions: Vec<Option<Vec<Version>>>,
    cached_deps: FxHashMap<(PackageId, Version), Vec<(PackageId, Range)>>,
    root_dependencies: Vec<(PackageId, Range)>,
    stats: ProviderStats,
}

impl<'a> ElmProvider<'a> {
    /// Create a provider over a loaded registry.
    ///
    /// When a cache handle is given, it is used both to read dependency
    /// constraints out of cached `elm.json` files and to filter out
    /// versions that declare an incompatible compiler constraint.
    pub fn new(
        registry: &'a Registry,
        cache: Option<&'a PackageCache>,
        compiler_version: Version,
    ) -> Self {
        Self {
            registry,
            cache,
            compiler_version,
            interner: Interner::new(),
            cached_versions: Vec::new(),
            cached_deps: FxHashMap::default(),
            root_dependencies: Vec::new(),
            stats: ProviderStats::default(),
        }
    }

    /// Register the root constraints the planner computed.
    /// They are what `dependencies` answers for the root package.
    pub fn set_root_dependencies(&mut self, deps: Vec<(PackageId, Range)>) {
        self.root_dependencies = deps;
    }

    /// Borrow the interner, for solution display.
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    fn compatible_with_compiler(&self, pkg: &Pkg, version: Version) -> bool {
        let cache = match self.cache {
            Some(cache) => cache,
            None => return true,
        };
        let pv = PkgVersion::new(pkg.clone(), version);
        match cache.load_config(&pv) {
            Ok(config) => config.elm_version.0.contains(self.compiler_version),
            // No cached metadata: keep the version, the fetch pipeline
            // will surface a real error if it is actually unusable.
            Err(_) => true,
        }
    }

    fn lookup_versions(&mut self, package: PackageId) -> Vec<Version> {
        let pkg = self.interner.name_of(package).clone();
        let from_registry: Vec<Version> = match self.registry.find(&pkg) {
            Some(entry) => entry.versions_newest_first().collect(),
            None => Vec::new(),
        };
        from_registry
            .into_iter()
            .filter(|v| self.compatible_with_compiler(&pkg, *v))
            .collect()
    }
}

impl<'a> DependencyProvider for ElmProvider<'a> {
    fn versions(&mut self, package: PackageId) -> Result<Vec<Version>, ProviderError> {
        let index = package.index();
        if index >= self.cached_versions.len() {
            self.cached_versions.resize(index + 1, None);
        }
        if let Some(cached) = &self.cached_versions[index] {
            self.stats.version_cache_hits += 1;
            return Ok(cached.clone());
        }
        self.stats.version_cache_misses += 1;
        let versions = self.lookup_versions(package);
        self.cached_versions[index] = Some(versions.clone());
        Ok(versions)
    }

    fn dependencies(
        &mut self,
        package: PackageId,
        version: Version,
    ) -> Result<Vec<(PackageId, Range)>, ProviderError> {
        if package == PackageId::ROOT {
            return Ok(self.root_dependencies.clone());
        }
        if let Some(deps) = self.cached_deps.get(&(package, version)) {
            return Ok(deps.clone());
        }
        let pkg = self.interner.name_of(package).clone();
        let from_registry = self
            .registry
            .find(&pkg)
            .and_then(|entry| entry.dependencies(version).cloned());
        let constraints = match from_registry {
            Some(deps) => deps,
            None => {
                let pv = PkgVersion::new(pkg.clone(), version);
                let cache = self
                    .cache
                    .ok_or_else(|| ProviderError::UnknownDependencies(pv.clone()))?;
                let config = cache
                    .load_config(&pv)
                    .map_err(|_| ProviderError::UnknownDependencies(pv))?;
                config.dependencies
            }
        };
        let deps: Vec<(PackageId, Range)> = constraints
            .iter()
            .map(|(dep, constraint)| (self.interner.intern(dep), constraint.0))
            .collect();
        self.cached_deps.insert((package, version), deps.clone());
        Ok(deps)
    }

    fn intern(&mut self, pkg: &Pkg) -> PackageId {
        self.interner.intern(pkg)
    }

    fn name_of(&self, package: PackageId) -> &Pkg {
        self.interner.name_of(package)
    }

    fn package_count(&self) -> usize {
        self.interner.len()
    }

    fn stats(&self) -> ProviderStats {
        self.stats
    }
}

/// Provider over a fixed in-memory package universe.
///
/// Mostly useful in tests and for solving against synthetic registries.
#[derive(Debug, Default)]
pub struct StaticProvider {
    interner: Interner,
    universe: FxHashMap<Pkg, Vec<(Version, Vec<(Pkg, Range)>)>>,
    root_dependencies: Vec<(Pkg, Range)>,
    stats: ProviderStats,
}

impl StaticProvider {
    /// Create an empty universe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one package version with its dependencies.
    pub fn add_version(&mut self, pkg: Pkg, version: Version, deps: Vec<(Pkg, Range)>) {
        let versions = self.universe.entry(pkg).or_default();
        versions.retain(|(v, _)| *v != version);
        versions.push((version, deps));
        versions.sort_by_key(|(v, _)| *v);
    }

    /// Set the root constraints.
    pub fn set_root_dependencies(&mut self, deps: Vec<(Pkg, Range)>) {
        self.root_dependencies = deps;
    }
}

impl DependencyProvider for StaticProvider {
    fn versions(&mut self, package: PackageId) -> Result<Vec<Version>, ProviderError> {
        self.stats.version_cache_misses += 1;
        let pkg = self.interner.name_of(package);
        Ok(self
            .universe
            .get(pkg)
            .map(|versions| versions.iter().rev().map(|(v, _)| *v).collect())
            .unwrap_or_default())
    }

    fn dependencies(
        &mut self,
        package: PackageId,
        version: Version,
    ) -> Result<Vec<(PackageId, Range)>, ProviderError> {
        if package == PackageId::ROOT {
            let root_deps = self.root_dependencies.clone();
            return Ok(root_deps
                .iter()
                .map(|(pkg, range)| (self.interner.intern(pkg), *range))
                .collect());
        }
        let pkg = self.interner.name_of(package).clone();
        let deps = self
            .universe
            .get(&pkg)
            .and_then(|versions| versions.iter().find(|(v, _)| *v == version))
            .map(|(_, deps)| deps.clone())
            .ok_or_else(|| {
                ProviderError::UnknownDependencies(PkgVersion::new(pkg.clone(), version))
            })?;
        Ok(deps
            .iter()
            .map(|(dep, range)| (self.interner.intern(dep), *range))
            .collect())
    }

    fn intern(&mut self, pkg: &Pkg) -> PackageId {
        self.interner.intern(pkg)
    }

    fn name_of(&self, package: PackageId) -> &Pkg {
        self.interner.name_of(package)
    }

    fn package_count(&self) -> usize {
        self.interner.len()
    }

    fn stats(&self) -> ProviderStats {
        self.stats
    }
}

// TESTS #######################################################################
