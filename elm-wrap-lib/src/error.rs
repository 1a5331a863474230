// SPDX-License-Identifier: MPL-2.0

//! Crate-wide error type, regrouping the per-module errors into the
//! taxonomy surfaced by the command-line layer.

use thiserror::Error;

use crate::cache::CacheError;
use crate::fetch::FetchError;
use crate::mirror::MirrorError;
use crate::planner::PlanError;
use crate::project_config::ProjectConfigError;
use crate::registry::RegistryError;
use crate::solver::SolveError;
use crate::transport::TransportError;

/// Any failure the library can surface to a caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed user input: bad version, bad constraint, bad package.
    #[error("{0}")]
    InvalidInput(String),

    /// Reading or writing a project config failed.
    #[error(transparent)]
    Config(#[from] ProjectConfigError),

    /// Loading or querying the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The fetch pipeline failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Planning or solving failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The solver aborted.
    #[error(transparent)]
    Solve(#[from] SolveError),

    /// A mirror run failed.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// A raw transport failure outside the fetch pipeline.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The §-level failure kinds the command-line layer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed version, constraint or argument.
    InvalidInput,
    /// A requested package is absent from the registry.
    UnknownPackage,
    /// The solver proved no assignment exists.
    NoSolution,
    /// Network needed while offline mode is active.
    Offline,
    /// An HTTP request failed.
    Network,
    /// A downloaded archive did not match its declared SHA-1.
    HashMismatch,
    /// A filesystem operation failed.
    Filesystem,
    /// A solver cap was hit; an internal error, not a verdict.
    CapExceeded,
}

impl Error {
    /// Classify the error into the surfaced taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Config(_) => ErrorKind::InvalidInput,
            Error::Registry(err) => match err {
                RegistryError::UnknownPackage(_) => ErrorKind::UnknownPackage,
                RegistryError::NoMatchingVersion { .. } => ErrorKind::NoSolution,
                RegistryError::FileIo { .. } => ErrorKind::Filesystem,
                _ => ErrorKind::InvalidInput,
            },
            Error::Cache(_) => ErrorKind::Filesystem,
            Error::Fetch(err) => match err {
                FetchError::Offline { .. } => ErrorKind::Offline,
                FetchError::Network { .. } => ErrorKind::Network,
                FetchError::HashMismatch { .. } => ErrorKind::HashMismatch,
                FetchError::BadEndpoint { .. } => ErrorKind::InvalidInput,
                _ => ErrorKind::Filesystem,
            },
            Error::Plan(err) => match err {
                PlanError::UnknownPackage(_) => ErrorKind::UnknownPackage,
                PlanError::NotADirectDependency(_) => ErrorKind::InvalidInput,
                PlanError::NoSolution { .. } => ErrorKind::NoSolution,
                PlanError::Solver(SolveError::CapExceeded(_)) => ErrorKind::CapExceeded,
                PlanError::Solver(_) => ErrorKind::Filesystem,
            },
            Error::Solve(err) => match err {
                SolveError::CapExceeded(_) => ErrorKind::CapExceeded,
                SolveError::Provider(_) => ErrorKind::Filesystem,
            },
            Error::Mirror(_) => ErrorKind::Filesystem,
            Error::Transport(err) => match err {
                TransportError::Offline { .. } => ErrorKind::Offline,
                _ => ErrorKind::Network,
            },
        }
    }
}
