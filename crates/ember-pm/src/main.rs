//! Ember Package Manager (emberpm)

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ember_pm::config::{default_config_path, registry_token};
use ember_pm::engine::{EngineError, ExecutionContext, ExecutionEngine, Global, Value};
use ember_pm::manifest::{find_project_root, generate_default, MANIFEST_FILE};
use ember_pm::semver::LATEST;
use ember_pm::validate::{package_identity, validate_manifest, PACKAGE_MANIFEST_FILE};
use ember_pm::{
    compare, satisfies, validate_structure, HttpTransport, Package, PackageSystem, PmConfig,
};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "emberpm")]
#[command(about = "Ember package manager", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Package registry URL
    #[arg(long, env = "EMBER_REGISTRY", global = true)]
    registry: Option<String>,

    /// Packages root directory
    #[arg(long, env = "EMBER_PACKAGES", value_name = "PATH", global = true)]
    root: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an ember.toml in a directory
    Init {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Add a dependency to the current project
    Add {
        package: String,
        /// Version constraint
        #[arg(default_value = "latest")]
        version: String,
    },
    /// Remove a dependency from the current project
    Remove { package: String },
    /// Record the imports of a script as dependencies
    Scan { script: PathBuf },
    /// Fetch packages, or every project dependency when none are named
    Install { packages: Vec<String> },
    /// Delete an installed package
    Uninstall { package: String },
    /// List installed packages
    List,
    /// Publish a package directory
    Publish {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Search the registry
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check a package directory
    Validate {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Compare two versions
    Compare { v1: String, v2: String },
    /// Check a version against a constraint
    Satisfies { version: String, constraint: String },
}

/// The CLI never evaluates package scripts; commands stop before loading.
struct NoEngine;

struct NoContext;

impl ExecutionContext for NoContext {
    fn evaluate(&mut self, _source: &str) -> Result<(), EngineError> {
        Err(EngineError::Evaluation(
            "emberpm cannot run Ember scripts".to_string(),
        ))
    }

    fn globals(&self) -> Vec<Global> {
        Vec::new()
    }

    fn set_global(&mut self, _name: &str, _value: Value) -> Result<(), EngineError> {
        Err(EngineError::CapacityExceeded)
    }
}

impl ExecutionEngine for NoEngine {
    fn new_context(&self) -> Box<dyn ExecutionContext> {
        Box::new(NoContext)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("EMBER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn system(cli: &Cli) -> anyhow::Result<PackageSystem> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = PmConfig::load(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    if let Some(root) = &cli.root {
        config.install_dir = root.clone();
    }

    let transport = HttpTransport::new(config.connection_timeout)?;
    let mut system = PackageSystem::new(config, Box::new(transport), Box::new(NoEngine));
    if let Some(url) = &cli.registry {
        system.set_registry(url)?;
    }
    Ok(system)
}

fn project_manifest() -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let root = find_project_root(&cwd)
        .with_context(|| format!("no {} found. Run `emberpm init` first.", MANIFEST_FILE))?;
    Ok(root.join(MANIFEST_FILE))
}

fn open_project(system: &mut PackageSystem) -> anyhow::Result<PathBuf> {
    let path = project_manifest()?;
    system.open_project(&path)?;
    Ok(path)
}

/// `name[@version]`, defaulting to `latest`
fn split_spec(spec: &str) -> (String, String) {
    match spec.split_once('@') {
        Some((name, version)) if !version.is_empty() => (name.to_string(), version.to_string()),
        Some((name, _)) => (name.to_string(), LATEST.to_string()),
        None => (spec.to_string(), LATEST.to_string()),
    }
}

fn validate_dir(dir: &Path) -> anyhow::Result<()> {
    let report = validate_structure(dir)?;
    if report.has_manifest {
        let content = fs::read_to_string(dir.join(PACKAGE_MANIFEST_FILE))?;
        validate_manifest(&content)?;
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    println!("{} is a valid package", dir.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { dir } => {
            let manifest = generate_default(dir)?;
            println!("Created {} for {}", MANIFEST_FILE, manifest.name);
        }
        Commands::Add { package, version } => {
            let mut system = system(&cli)?;
            let path = open_project(&mut system)?;
            system.add_dependency(package, version)?;
            system.save_project(&path)?;
            println!("Added {}@{}", package, version.trim());
        }
        Commands::Remove { package } => {
            let mut system = system(&cli)?;
            let path = open_project(&mut system)?;
            let removed = system
                .project_mut()
                .is_some_and(|p| p.remove_dependency(package));
            if !removed {
                bail!("{} is not a dependency", package);
            }
            system.save_project(&path)?;
            println!("Removed {}", package);
        }
        Commands::Scan { script } => {
            let mut system = system(&cli)?;
            let path = open_project(&mut system)?;
            let found = system.scan_imports(script)?;
            system.save_project(&path)?;
            println!("Recorded {} import(s)", found);
        }
        Commands::Install { packages } => {
            let mut system = system(&cli)?;
            let requests: Vec<(String, String)> = if packages.is_empty() {
                open_project(&mut system)?;
                system
                    .project()
                    .map(|p| {
                        p.dependencies()
                            .iter()
                            .map(|d| (d.name.clone(), d.version.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                packages.iter().map(|spec| split_spec(spec)).collect()
            };

            let summary = system.prefetch(&requests);
            for name in &summary.installed {
                println!("installed {}", name);
            }
            for (name, error) in &summary.failed {
                eprintln!("failed {}: {}", name, error);
            }
            if !summary.is_success() {
                bail!("{} package(s) failed", summary.failed.len());
            }
        }
        Commands::Uninstall { package } => {
            system(&cli)?.uninstall(package)?;
            println!("Uninstalled {}", package);
        }
        Commands::List => {
            let system = system(&cli)?;
            for name in system.list_installed()? {
                println!("{}", name);
            }
        }
        Commands::Publish { dir } => {
            if registry_token().is_none() {
                bail!("set EMBER_REGISTRY_TOKEN to publish");
            }
            let (name, version) = package_identity(dir)?;
            let mut pkg = Package::new(name, version);
            pkg.local_path = Some(dir.clone());

            println!("Publishing {}@{}", pkg.name, pkg.version);
            system(&cli)?.publish(&pkg)?;
            println!("Published {}@{}", pkg.name, pkg.version);
        }
        Commands::Search { query, limit } => {
            let hits = system(&cli)?.search(query, *limit)?;
            if hits.is_empty() {
                println!("No packages found");
            }
            for hit in hits {
                println!("{} {} - {}", hit.name, hit.version, hit.description);
            }
        }
        Commands::Validate { dir } => validate_dir(dir)?,
        Commands::Compare { v1, v2 } => {
            let result = match compare(v1, v2) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            println!("{}", result);
        }
        Commands::Satisfies {
            version,
            constraint,
        } => {
            let ok = satisfies(version, constraint);
            println!("{}", ok);
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
