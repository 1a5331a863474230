// SPDX-License-Identifier: MPL-2.0

//! The elm-wrap command line tool.
//!
//! Owns everything the library deliberately does not: environment
//! resolution, the real HTTP client, confirmation prompts, exit codes,
//! and the pass-through to the external elm compiler.

mod cli;

use anyhow::Context;
use clap::Parser;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::time::Duration;

use elm_wrap::blacklist::Blacklist;
use elm_wrap::bulk::{BulkConfig, BulkDownloader};
use elm_wrap::cache::PackageCache;
use elm_wrap::fetch::{ArchiveSource, Downloader};
use elm_wrap::mirror::{MirrorBuilder, MirrorConfig};
use elm_wrap::pkg_version::PkgVersion;
use elm_wrap::planner::{self, PlanError, PlanOutcome, PlannerContext, Request};
use elm_wrap::project_config::{Pkg, ProjectConfig};
use elm_wrap::registry::Registry;
use elm_wrap::transport::{OfflineTransport, Transport, TransportError};
use elm_wrap::version::Version;

/// The compiler generation this tool manages packages for.
const ELM_COMPILER_VERSION: &str = "0.19.1";

/// Default upstream package registry.
const DEFAULT_REGISTRY: &str = "https://package.elm-lang.org";

/// Default per-request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Raised timeout for registry-wide bulk operations.
const BULK_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

fn main() {
    let cli = cli::Cli::parse();
    init_logger(&cli);
    match run(cli.command) {
        Ok(code) => exit(code),
        Err(err) => exit(report_error(err)),
    }
}

/// Print the error with its taxonomy kind when it comes from the
/// library, then map it to the failure exit code.
fn report_error(err: anyhow::Error) -> i32 {
    match err.downcast_ref::<elm_wrap::Error>().map(elm_wrap::Error::kind) {
        Some(elm_wrap::ErrorKind::CapExceeded) => eprintln!("internal-error: {:#}", err),
        Some(elm_wrap::ErrorKind::Offline) => {
            eprintln!("Error: {:#}", err);
            eprintln!("Re-run without --offline to allow network access.");
        }
        _ => eprintln!("Error: {:#}", err),
    }
    1
}

fn init_logger(cli: &cli::Cli) {
    let default_filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run(command: cli::Command) -> anyhow::Result<i32> {
    match command {
        cli::Command::Install {
            package,
            dry_run,
            yes,
            offline,
        } => cmd_install(package, dry_run, yes, offline),
        cli::Command::Upgrade {
            major,
            dry_run,
            yes,
        } => cmd_upgrade(major, dry_run, yes),
        cli::Command::Remove { package } => cmd_remove(&package),
        cli::Command::Package {
            command: cli::PackageCommand::Cache { command },
        } => match command {
            cli::CacheCommand::Missing {
                path,
                from_github: _,
                from_registry,
                yes,
            } => cmd_cache_missing(path, from_registry, yes),
            cli::CacheCommand::DownloadAll { bulk } => cmd_download_all(bulk),
        },
        cli::Command::Repository {
            command:
                cli::RepositoryCommand::Mirror {
                    output_dir,
                    manifest,
                    full,
                    packages,
                    bulk,
                },
        } => cmd_mirror(output_dir, manifest, full, packages, bulk),
        cli::Command::External(args) => run_compiler(args),
    }
}

// Commands ####################################################################

fn cmd_install(
    package: Option<String>,
    dry_run: bool,
    yes: bool,
    offline: bool,
) -> anyhow::Result<i32> {
    let config = load_project_config(None)?;
    let cache = package_cache();
    let registry = load_registry(&cache)?;
    let request = package.as_deref().map(parse_request).transpose()?;
    let ctx = PlannerContext {
        registry: &registry,
        cache: Some(&cache),
        compiler_version: compiler_version(),
    };
    let outcome = match planner::plan_install(&config, request.as_ref(), &ctx) {
        Ok(outcome) => outcome,
        Err(PlanError::NoSolution { explanation }) => {
            eprintln!("{}", explanation);
            return Ok(1);
        }
        Err(err) => return Err(elm_wrap::Error::from(err).into()),
    };
    apply_plan(outcome, dry_run, yes, offline, &cache)
}

fn cmd_upgrade(major: bool, dry_run: bool, yes: bool) -> anyhow::Result<i32> {
    let config = load_project_config(None)?;
    let cache = package_cache();
    let registry = load_registry(&cache)?;
    let ctx = PlannerContext {
        registry: &registry,
        cache: Some(&cache),
        compiler_version: compiler_version(),
    };
    let outcome = match planner::plan_upgrade(&config, major, &ctx) {
        Ok(outcome) => outcome,
        Err(PlanError::NoSolution { explanation }) => {
            eprintln!("{}", explanation);
            return Ok(1);
        }
        Err(err) => return Err(elm_wrap::Error::from(err).into()),
    };
    apply_plan(outcome, dry_run, yes, false, &cache)
}

fn apply_plan(
    outcome: PlanOutcome,
    dry_run: bool,
    yes: bool,
    offline: bool,
    cache: &PackageCache,
) -> anyhow::Result<i32> {
    if outcome.plan.is_empty() {
        println!("Dependencies are already up to date.");
        return Ok(0);
    }
    println!("Resolved with strategy {}:", outcome.strategy);
    println!("{}", outcome.plan);
    if dry_run {
        return Ok(0);
    }
    if !confirm("Apply these changes?", yes)? {
        return Ok(1);
    }
    let transport = make_transport(offline, HTTP_TIMEOUT);
    let downloader = Downloader::new(&transport, cache, DEFAULT_REGISTRY);
    planner::fetch_changes(&outcome.plan, &downloader).map_err(elm_wrap::Error::from)?;
    outcome
        .updated_config
        .save("elm.json")
        .context("failed to rewrite elm.json")?;
    println!("Done.");
    Ok(0)
}

fn cmd_remove(package: &str) -> anyhow::Result<i32> {
    let config = load_project_config(None)?;
    let pkg = Pkg::from_str(package)
        .map_err(|err| anyhow::anyhow!("invalid package `{}`: {}", package, err))?;
    let outcome = match planner::plan_remove(&config, &pkg) {
        Ok(outcome) => outcome,
        Err(PlanError::NotADirectDependency(pkg)) => {
            eprintln!("{} is not a direct dependency of this project.", pkg);
            return Ok(1);
        }
        Err(err) => return Err(elm_wrap::Error::from(err).into()),
    };
    println!("{}", outcome.plan);
    outcome
        .updated_config
        .save("elm.json")
        .context("failed to rewrite elm.json")?;
    Ok(0)
}

fn cmd_cache_missing(
    path: Option<PathBuf>,
    from_registry: bool,
    yes: bool,
) -> anyhow::Result<i32> {
    let config = load_project_config(path)?;
    let cache = package_cache();
    let registry = load_registry(&cache)?;
    let ctx = PlannerContext {
        registry: &registry,
        cache: Some(&cache),
        compiler_version: compiler_version(),
    };
    let outcome =
        match planner::solve_with_strategy(&config, None, planner::Strategy::ExactAll, &ctx) {
            Ok(elm_wrap::solver::SolveOutcome::Solution(solution)) => solution,
            Ok(elm_wrap::solver::SolveOutcome::NoSolution { explanation }) => {
                eprintln!("{}", explanation);
                return Ok(1);
            }
            Err(err) => return Err(elm_wrap::Error::from(err).into()),
        };
    let missing: Vec<PkgVersion> = outcome
        .into_iter()
        .map(|(pkg, version)| PkgVersion::new(pkg, version))
        .filter(|pv| !cache.fully_downloaded(pv))
        .collect();
    if missing.is_empty() {
        println!("All packages are present in the cache.");
        return Ok(0);
    }
    println!("{} package(s) missing from the cache:", missing.len());
    for pv in &missing {
        println!("  {}", pv);
    }
    if !confirm("Download them?", yes)? {
        return Ok(1);
    }
    let transport = make_transport(false, HTTP_TIMEOUT);
    let source = if from_registry {
        ArchiveSource::Registry
    } else {
        ArchiveSource::Endpoint
    };
    let downloader =
        Downloader::new(&transport, &cache, DEFAULT_REGISTRY).archive_source(source);
    let mut failed = 0;
    for pv in &missing {
        if let Err(err) = downloader.fetch(pv) {
            log::warn!("fetching {} failed: {}", pv, err);
            failed += 1;
        }
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

fn cmd_download_all(args: cli::BulkArgs) -> anyhow::Result<i32> {
    let cache = package_cache();
    let registry = load_registry(&cache)?;
    let blacklist = Blacklist::load(wrap_home().join("blacklist.txt"))?;
    if !args.dry_run {
        let prompt = format!(
            "Download up to {} package versions into the cache?",
            registry.version_count()
        );
        if !confirm(&prompt, args.yes)? {
            return Ok(1);
        }
    }
    let transport = make_transport(false, BULK_HTTP_TIMEOUT);
    let downloader = Downloader::new(&transport, &cache, DEFAULT_REGISTRY);
    let config = BulkConfig {
        latest_only: args.latest_only,
        dry_run: args.dry_run,
        fail_log: args.fail_log,
        ..BulkConfig::default()
    };
    let report = BulkDownloader::new(&downloader, &registry, &blacklist, config).run();
    if args.dry_run {
        for pv in &report.queued {
            println!("would download {}", pv);
        }
        return Ok(0);
    }
    println!(
        "{} downloaded, {} failed, {} already cached, {} skipped",
        report.downloaded, report.failed, report.already_cached, report.skipped
    );
    Ok(if report.failed == 0 { 0 } else { 1 })
}

fn cmd_mirror(
    output_dir: PathBuf,
    manifest: Option<PathBuf>,
    full: bool,
    packages: Vec<String>,
    args: cli::BulkArgs,
) -> anyhow::Result<i32> {
    let cache = package_cache();
    let registry = load_registry(&cache)?;
    let blacklist = Blacklist::load(wrap_home().join("blacklist.txt"))?;
    let packages: Vec<Pkg> = packages
        .iter()
        .map(|p| {
            Pkg::from_str(p).map_err(|err| anyhow::anyhow!("invalid package `{}`: {}", p, err))
        })
        .collect::<anyhow::Result<_>>()?;
    let mut config = MirrorConfig::new(
        output_dir,
        wrap_home().join("mirror-since.txt"),
        DEFAULT_REGISTRY.to_string(),
    );
    if let Some(manifest) = manifest {
        config.manifest_path = manifest;
    }
    config.full = full;
    config.latest_only = args.latest_only;
    config.packages = packages;
    config.dry_run = args.dry_run;
    config.fail_log = args.fail_log;
    if !args.dry_run {
        let prompt = format!("Mirror the registry into {}?", config.output_dir.display());
        if !confirm(&prompt, args.yes)? {
            return Ok(1);
        }
    }
    let transport = make_transport(false, BULK_HTTP_TIMEOUT);
    let downloader = Downloader::new(&transport, &cache, DEFAULT_REGISTRY);
    let report = MirrorBuilder::new(&downloader, &registry, &blacklist, config).run()?;
    if args.dry_run {
        for pv in &report.queued {
            println!("would mirror {}", pv);
        }
        return Ok(0);
    }
    println!(
        "{} mirrored, {} failed, {} skipped",
        report.processed, report.failed, report.skipped
    );
    Ok(if report.failed == 0 { 0 } else { 1 })
}

/// Re-run the invocation against the external elm compiler, with the
/// network blocked unless explicitly allowed.
fn run_compiler(args: Vec<OsString>) -> anyhow::Result<i32> {
    let compiler = std::env::var_os("WRAP_ELM_COMPILER_PATH")
        .unwrap_or_else(|| OsString::from("elm"));
    let mut command = std::process::Command::new(&compiler);
    command.args(&args);
    let allow_online = std::env::var("WRAP_ALLOW_ELM_ONLINE")
        .map(|v| v == "1")
        .unwrap_or(false);
    if !allow_online {
        // Point the child compiler at an unroutable proxy so its own
        // package downloads cannot bypass the wrapper.
        command
            .env("HTTP_PROXY", "http://127.0.0.1:1")
            .env("HTTPS_PROXY", "http://127.0.0.1:1");
    }
    let status = command
        .status()
        .with_context(|| format!("failed to run the elm compiler {:?}", compiler))?;
    Ok(status.code().unwrap_or(1))
}

// Environment #################################################################

fn elm_home() -> PathBuf {
    match std::env::var_os("ELM_HOME") {
        None => default_elm_home(),
        Some(os_string) => os_string.into(),
    }
}

#[cfg(target_family = "unix")]
fn default_elm_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".elm")
}

#[cfg(target_family = "windows")]
fn default_elm_home() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("elm")
}

fn wrap_home() -> PathBuf {
    match std::env::var_os("WRAP_HOME") {
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".elm-wrap"),
        Some(os_string) => os_string.into(),
    }
}

fn package_cache() -> PackageCache {
    PackageCache::new(elm_home(), ELM_COMPILER_VERSION)
}

fn compiler_version() -> Version {
    Version::from_str(ELM_COMPILER_VERSION).unwrap_or_else(|_| Version::new(0, 19, 1))
}

fn load_project_config(path: Option<PathBuf>) -> anyhow::Result<ProjectConfig> {
    let elm_json = match path {
        Some(dir) => dir.join("elm.json"),
        None => PathBuf::from("elm.json"),
    };
    ProjectConfig::load(&elm_json)
        .with_context(|| format!("are you in an elm project? failed to load {}", elm_json.display()))
}

fn load_registry(cache: &PackageCache) -> anyhow::Result<Registry> {
    let path = cache.registry_path();
    if path.is_file() {
        Ok(Registry::load(&path).map_err(elm_wrap::Error::from)?)
    } else {
        log::info!(
            "no registry index at {}, scanning the cache instead",
            path.display()
        );
        Ok(Registry::from_cache_dir(cache.packages_root()).map_err(elm_wrap::Error::from)?)
    }
}

fn parse_request(s: &str) -> anyhow::Result<Request> {
    if s.contains('@') {
        let pv = PkgVersion::from_str(s)
            .map_err(|err| anyhow::anyhow!("invalid package `{}`: {}", s, err))?;
        Ok(Request {
            pkg: pv.author_pkg,
            version: Some(pv.version),
        })
    } else {
        let pkg = Pkg::from_str(s)
            .map_err(|err| anyhow::anyhow!("invalid package `{}`: {}", s, err))?;
        Ok(Request { pkg, version: None })
    }
}

// Helpers #####################################################################

fn make_transport(offline: bool, timeout: Duration) -> Box<dyn Transport> {
    if offline {
        Box::new(OfflineTransport)
    } else {
        Box::new(UreqTransport { timeout })
    }
}

fn confirm(prompt: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{} [Y/n] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(!matches!(answer.trim().chars().next(), Some('n' | 'N')))
}

/// Blocking HTTP client over ureq.
struct UreqTransport {
    timeout: Duration,
}

impl UreqTransport {
    fn request(&self, url: &str) -> Result<ureq::Response, TransportError> {
        let response = ureq::get(url)
            .timeout_connect(10_000)
            .timeout(self.timeout)
            .call();
        if response.ok() {
            Ok(response)
        } else {
            Err(TransportError::Status {
                url: url.to_string(),
                status: response.status(),
            })
        }
    }
}

impl Transport for UreqTransport {
    fn fetch_string(&self, url: &str) -> Result<String, TransportError> {
        self.request(url)?
            .into_string()
            .map_err(|e| TransportError::Network {
                url: url.to_string(),
                source: e.into(),
            })
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let mut reader = self.request(url)?.into_reader();
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| TransportError::Network {
                url: url.to_string(),
                source: e.into(),
            })?;
        Ok(bytes)
    }
}
