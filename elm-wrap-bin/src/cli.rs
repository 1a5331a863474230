// SPDX-License-Identifier: MPL-2.0

//! Command-line definitions.
//!
//! Any invocation that is not one of the wrapper's own subcommands is
//! passed through to the external elm compiler.

use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// A command-line wrapper around the elm compiler with an independent
/// package installer, cache and registry manager.
#[derive(Debug, Parser)]
#[command(name = "elm-wrap", version, about, disable_help_subcommand = true)]
pub struct Cli {
    /// Print debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install a package, or everything the project elm.json needs.
    Install {
        /// Package to install, as author/name or author/name@x.y.z.
        package: Option<String>,

        /// Print the plan without fetching or rewriting anything.
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Never touch the network.
        #[arg(long)]
        offline: bool,
    },

    /// Upgrade the project dependencies.
    Upgrade {
        /// Allow upgrades across major versions.
        #[arg(long)]
        major: bool,

        /// Print the plan without fetching or rewriting anything.
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove a direct dependency from the project elm.json.
    Remove {
        /// Package to remove, as author/name.
        package: String,
    },

    /// Package cache operations.
    Package {
        #[command(subcommand)]
        command: PackageCommand,
    },

    /// Registry-wide repository operations.
    Repository {
        #[command(subcommand)]
        command: RepositoryCommand,
    },

    /// Anything else is forwarded to the elm compiler.
    #[command(external_subcommand)]
    External(Vec<OsString>),
}

#[derive(Debug, Subcommand)]
pub enum PackageCommand {
    /// Package cache queries and bulk filling.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Download every package the project elm.json needs but the cache
    /// does not fully hold.
    Missing {
        /// Project directory, current directory by default.
        path: Option<PathBuf>,

        /// Download archives from the urls in endpoint.json.
        #[arg(long, conflicts_with = "from_registry")]
        from_github: bool,

        /// Download archives from the registry mirror layout.
        #[arg(long)]
        from_registry: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Download the whole registry into the cache.
    DownloadAll {
        #[command(flatten)]
        bulk: BulkArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum RepositoryCommand {
    /// Build or refresh a content-addressed package mirror.
    Mirror {
        /// Output directory of the mirror layout.
        #[arg(long, default_value = "mirror")]
        output_dir: PathBuf,

        /// Manifest path, `<output-dir>/manifest.json` by default.
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Ignore the resume marker and the existing manifest.
        #[arg(long)]
        full: bool,

        /// Restrict the run to these packages (repeatable).
        #[arg(long = "package")]
        packages: Vec<String>,

        #[command(flatten)]
        bulk: BulkArgs,
    },
}

/// Flags shared by the registry-wide bulk drivers.
#[derive(Debug, Args)]
pub struct BulkArgs {
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Report the queue without downloading anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Only consider the newest version of each package.
    #[arg(long)]
    pub latest_only: bool,

    /// Append failures to this file in blacklist format.
    #[arg(long)]
    pub fail_log: Option<PathBuf>,
}
