// SPDX-License-Identifier: MPL-2.0

//! # Package resolution and provisioning for the elm ecosystem
//!
//! The elm-wrap crate provides a set of types, functions and traits to
//! resolve, download, verify and mirror elm packages without relying on
//! the official package website at build time.
//!
//! The main objective of dependency solving is to start from a set of
//! dependency constraints, provided for example by the `elm.json` of a
//! project:
//!
//! ```json
//! {
//!   ...,
//!   "dependencies": {
//!     "direct": { "elm/core": "1.0.5", "elm/http": "2.0.0" },
//!     "indirect": { "elm/json": "1.1.3" }
//!   }
//! }
//! ```
//!
//! and find a set of package versions satisfying these constraints,
//! preferring the newest compatible versions. Solving is done by an
//! in-crate PubGrub-style solver ([`solver`]) driven by a
//! [`planner`](planner) that translates the current lock into root
//! constraints under a named [`Strategy`](planner::Strategy), and
//! explains failures with a numbered narrative.
//!
//! Around the solver, the crate manages the whole provisioning chain:
//!
//! - [`registry`]: the package index (binary `registry.dat`, text
//!   protocol-v2, or all-packages JSON), answering version lists and
//!   constraint resolution.
//! - [`cache`]: the content-addressed on-disk package store under
//!   `ELM_HOME/<compiler>/packages`, with completeness queries.
//! - [`fetch`]: the metadata/archive/verify/extract pipeline, behind
//!   the [`transport`] seam so callers choose the HTTP client.
//! - [`mirror`] and [`bulk`]: registry-wide drivers that fill a
//!   content-addressed mirror layout or the cache itself, with
//!   blacklist, retry, resume and fail-log support.
//!
//! ## Solving dependencies of a project
//!
//! ```no_run
//! use elm_wrap::planner::{self, PlannerContext, Request};
//! use elm_wrap::project_config::ProjectConfig;
//! use elm_wrap::registry::Registry;
//! use elm_wrap::version::Version;
//!
//! let config = ProjectConfig::load("elm.json").expect("not an elm project");
//! let registry = Registry::load("registry.dat").expect("no registry index");
//! let ctx = PlannerContext {
//!     registry: &registry,
//!     cache: None,
//!     compiler_version: Version::new(0, 19, 1),
//! };
//! let request = Request { pkg: "elm/http".parse().unwrap(), version: None };
//! let outcome = planner::plan_install(&config, Some(&request), &ctx)
//!     .expect("dependency solving failed");
//! println!("{}", outcome.plan);
//! ```
//!
//! ## Helper modules
//!
//! - [`version`]: semantic versions and bounded version ranges.
//! - [`constraint`]: the elm constraint syntax `1.0.0 <= v < 2.0.0`.
//! - [`project_config`]: serialization of `elm.json` files.
//! - [`pkg_version`]: the `author/name@version` identifier.
//! - [`blacklist`]: the skip-list format shared by bulk operations.
//! - [`error`]: the crate-wide error taxonomy.

#![warn(missing_docs)]

pub mod blacklist;
pub mod bulk;
pub mod cache;
pub mod constraint;
pub mod error;
pub mod fetch;
pub mod mirror;
pub mod pkg_version;
pub mod planner;
pub mod project_config;
pub mod registry;
pub mod solver;
pub mod transport;
pub mod version;

pub use error::{Error, ErrorKind};
