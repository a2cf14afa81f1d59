//! Install pipeline
//!
//! [`PackageSystem`] owns everything the pipeline needs: configuration, the
//! package registry, the open project manifest, the network transport and
//! the execution engine. A package moves through
//! discover → fetch → validate → load → register → bridge; a failure at any
//! step is reported as a [`PmError::Stage`] naming the step.

use crate::archive::{create_tarball, extract_stripped};
use crate::bridge::import_functions;
use crate::config::{registry_token, PmConfig};
use crate::discover::PackageLocator;
use crate::engine::{ExecutionContext, ExecutionEngine};
use crate::error::{PmError, Result};
use crate::manifest::ProjectManifest;
use crate::package::Package;
use crate::registry::PackageRegistry;
use crate::security::{
    create_directory_recursive, format_size, validate_name, validate_package_name, validate_version,
};
use crate::transport::Transport;
use crate::validate::{read_script, validate_structure, ValidationReport};
use crossbeam::channel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

/// Largest archive accepted from the registry
pub const MAX_FETCH_ARCHIVE: u64 = 100 * 1024 * 1024;

/// Largest archive that will be published
pub const MAX_PUBLISH_ARCHIVE: u64 = 50 * 1024 * 1024;

static PUBLISH_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Pipeline steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Discovered,
    Fetched,
    Validated,
    Loaded,
    Registered,
    Bridged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Stage::Discovered => "discover",
            Stage::Fetched => "fetch",
            Stage::Validated => "validate",
            Stage::Loaded => "load",
            Stage::Registered => "register",
            Stage::Bridged => "bridge",
        };
        f.write_str(step)
    }
}

fn at(stage: Stage, package: &str) -> impl FnOnce(PmError) -> PmError + '_ {
    move |source| PmError::Stage {
        package: package.to_string(),
        stage,
        source: Box::new(source),
    }
}

/// Outcome of a successful [`PackageSystem::install`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub name: String,
    pub version: String,
    /// Last stage reached
    pub stage: Stage,
    pub warnings: Vec<String>,
}

/// Outcome of a multi-package operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub installed: Vec<String>,
    /// `(name, error message)`
    pub failed: Vec<(String, String)>,
}

impl InstallSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One registry search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchBody {
    Hits(Vec<SearchHit>),
    Wrapped { results: Vec<SearchHit> },
}

/// Registry URL with `segments` appended to its path
fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| PmError::invalid("registry URL", format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| PmError::invalid("registry URL", format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| PmError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| PmError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Download and unpack `pkg` into `<install_dir>/<name>`.
fn fetch_package(transport: &dyn Transport, config: &PmConfig, pkg: &mut Package) -> Result<()> {
    validate_package_name(&pkg.name)?;
    validate_version(&pkg.version)?;
    if pkg.version.contains(['/', '\\']) {
        return Err(PmError::Security(format!(
            "version contains a path separator: {}",
            pkg.version
        )));
    }

    let root = &config.install_dir;
    create_directory_recursive(root)?;

    let url = endpoint(
        &config.registry_url,
        &["download", pkg.name.as_str(), pkg.version.as_str()],
    )?;
    let archive = root.join(format!("{}-{}.tar.gz", pkg.name, pkg.version));
    info!(name = %pkg.name, version = %pkg.version, %url, "fetching package");

    let token = registry_token();
    if let Err(e) = transport.download_file(url.as_str(), &archive, token.as_deref()) {
        let _ = fs::remove_file(&archive);
        return Err(e);
    }

    let result = unpack_archive(config, pkg, &archive);
    if let Err(e) = fs::remove_file(&archive) {
        debug!(archive = %archive.display(), error = %e, "could not remove archive");
    }
    result
}

/// Size of `archive`, which must be non-empty and at most `max` bytes
fn check_archive_size(archive: &Path, name: &str, max: u64) -> Result<u64> {
    let size = fs::metadata(archive)
        .map_err(|e| PmError::io(archive, e))?
        .len();
    if size == 0 || size > max {
        return Err(PmError::ResourceLimit {
            what: format!("archive for {}", name),
            size,
            max,
        });
    }
    Ok(size)
}

fn unpack_archive(config: &PmConfig, pkg: &mut Package, archive: &Path) -> Result<()> {
    check_archive_size(archive, &pkg.name, MAX_FETCH_ARCHIVE)?;

    if config.verify_checksums {
        let checksum = sha256_file(archive)?;
        debug!(name = %pkg.name, %checksum, "archive checksum");
        pkg.checksum = Some(checksum);
    }

    let dir = config.install_dir.join(&pkg.name);
    let existed = dir.exists();
    create_directory_recursive(&dir)?;
    if let Err(e) = extract_stripped(archive, &dir) {
        if !existed {
            let _ = fs::remove_dir_all(&dir);
        }
        return Err(e);
    }

    pkg.local_path = Some(dir);
    Ok(())
}

fn validate_package(pkg: &mut Package) -> Result<ValidationReport> {
    let dir = pkg
        .local_path
        .as_deref()
        .ok_or_else(|| PmError::NotFound(format!("no local copy of {}", pkg.name)))?;
    let report = validate_structure(dir)?;
    pkg.verified = true;
    Ok(report)
}

/// Evaluate the package script in a fresh context. The context is disposed
/// if evaluation fails.
fn load_package(engine: &dyn ExecutionEngine, pkg: &mut Package) -> Result<()> {
    if pkg.is_loaded() {
        return Ok(());
    }

    let dir = pkg
        .local_path
        .as_deref()
        .ok_or_else(|| PmError::NotFound(format!("no local copy of {}", pkg.name)))?;
    let source = read_script(dir)?;

    let mut context = engine.new_context();
    if let Err(e) = context.evaluate(&source) {
        context.dispose();
        return Err(PmError::invalid(
            "package script",
            format!("{}: {}", pkg.name, e),
        ));
    }

    pkg.attach(context);
    info!(name = %pkg.name, version = %pkg.version, "loaded package");
    Ok(())
}

/// Fetch (if needed) and validate one package; used by pool workers
fn prefetch_one(
    locator: &PackageLocator,
    transport: &dyn Transport,
    config: &PmConfig,
    name: &str,
    version: &str,
) -> Result<Package> {
    let mut pkg = locator.discover(name).map_err(at(Stage::Discovered, name))?;
    if pkg.local_path.is_none() {
        if !version.trim().is_empty() {
            pkg.version = version.trim().to_string();
        }
        fetch_package(transport, config, &mut pkg).map_err(at(Stage::Fetched, name))?;
    }
    validate_package(&mut pkg).map_err(at(Stage::Validated, name))?;
    Ok(pkg)
}

/// Temporary directory removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(path: PathBuf) -> Result<Self> {
        create_directory_recursive(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            debug!(path = %self.path.display(), error = %e, "could not remove scratch dir");
        }
    }
}

/// Package manager state
pub struct PackageSystem {
    config: PmConfig,
    registry: PackageRegistry,
    project: Option<ProjectManifest>,
    transport: Box<dyn Transport>,
    engine: Box<dyn ExecutionEngine>,
    last_error: Option<String>,
}

impl PackageSystem {
    pub fn new(
        config: PmConfig,
        transport: Box<dyn Transport>,
        engine: Box<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            config,
            registry: PackageRegistry::new(),
            project: None,
            transport,
            engine,
            last_error: None,
        }
    }

    /// Record a failure in the last-error slot and pass the result through
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, "package operation failed");
            self.last_error = Some(e.to_string());
        }
        result
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn config(&self) -> &PmConfig {
        &self.config
    }

    pub fn configure(&mut self, config: PmConfig) {
        debug!(?config, "applying configuration");
        self.config = config;
    }

    pub fn load_config(&mut self, path: &Path) -> Result<()> {
        let result = PmConfig::load(path);
        let config = self.track(result)?;
        self.configure(config);
        Ok(())
    }

    pub fn save_config(&mut self, path: &Path) -> Result<()> {
        let result = self.config.save(path);
        self.track(result)
    }

    /// Point the system at another registry
    pub fn set_registry(&mut self, url: &str) -> Result<()> {
        let result = Url::parse(url)
            .map(|_| ())
            .map_err(|e| PmError::invalid("registry URL", format!("{}: {}", url, e)));
        self.track(result)?;
        info!(url, "registry changed");
        self.config.registry_url = url.trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn locator(&self) -> PackageLocator {
        PackageLocator::new(&self.config.install_dir, &self.config.registry_url)
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PackageRegistry {
        &mut self.registry
    }

    pub fn project(&self) -> Option<&ProjectManifest> {
        self.project.as_ref()
    }

    pub fn project_mut(&mut self) -> Option<&mut ProjectManifest> {
        self.project.as_mut()
    }

    pub fn set_project(&mut self, project: ProjectManifest) {
        self.project = Some(project);
    }

    /// Load a project manifest and make it the current project
    pub fn open_project(&mut self, path: &Path) -> Result<()> {
        let result = ProjectManifest::load(path, &self.locator());
        let project = self.track(result)?;
        self.project = Some(project);
        Ok(())
    }

    fn require_project(&self) -> Result<&ProjectManifest> {
        self.project
            .as_ref()
            .ok_or_else(|| PmError::NotFound("no project manifest loaded".to_string()))
    }

    pub fn save_project(&mut self, path: &Path) -> Result<()> {
        let result = self.require_project().and_then(|p| p.save(path));
        self.track(result)
    }

    /// Declare a dependency in the current project
    pub fn add_dependency(&mut self, name: &str, version: &str) -> Result<()> {
        let locator = self.locator();
        let result = match self.project.as_mut() {
            Some(project) => project.add_dependency(name, version, &locator),
            None => Err(PmError::NotFound("no project manifest loaded".to_string())),
        };
        self.track(result)
    }

    /// Scan a script for imports into the current project
    pub fn scan_imports(&mut self, script: &Path) -> Result<usize> {
        let locator = self.locator();
        let result = match self.project.as_mut() {
            Some(project) => project.scan_imports(script, &locator),
            None => Err(PmError::NotFound("no project manifest loaded".to_string())),
        };
        self.track(result)
    }

    pub fn discover(&mut self, name: &str) -> Result<Package> {
        let result = self.locator().discover(name);
        self.track(result)
    }

    /// Download and unpack a discovered package
    pub fn fetch(&mut self, pkg: &mut Package) -> Result<()> {
        let result = fetch_package(self.transport.as_ref(), &self.config, pkg);
        self.track(result)
    }

    pub fn validate(&mut self, pkg: &mut Package) -> Result<ValidationReport> {
        let result = validate_package(pkg);
        self.track(result)
    }

    pub fn load(&mut self, pkg: &mut Package) -> Result<()> {
        let result = load_package(self.engine.as_ref(), pkg);
        self.track(result)
    }

    pub fn register(&mut self, pkg: Package) {
        self.registry.add(pkg);
    }

    /// Bridge a registered, loaded package into `target`
    pub fn bridge(&mut self, name: &str, target: &mut dyn ExecutionContext) -> Result<usize> {
        let result = match self.registry.find(name) {
            Some(pkg) => import_functions(pkg, target),
            None => Err(PmError::NotFound(format!("package {} is not registered", name))),
        }
        .map_err(at(Stage::Bridged, name));
        self.track(result)
    }

    /// Run the pipeline up to registration.
    ///
    /// `version` only applies to packages that have to be fetched; local
    /// packages keep the version `local`.
    pub fn install(&mut self, name: &str, version: Option<&str>) -> Result<InstallReport> {
        let result = self.run_install(name, version);
        self.track(result)
    }

    fn run_install(&mut self, name: &str, version: Option<&str>) -> Result<InstallReport> {
        let mut pkg = self
            .locator()
            .discover(name)
            .map_err(at(Stage::Discovered, name))?;

        if pkg.local_path.is_none() {
            if let Some(version) = version.map(str::trim).filter(|v| !v.is_empty()) {
                pkg.version = version.to_string();
            }
            fetch_package(self.transport.as_ref(), &self.config, &mut pkg)
                .map_err(at(Stage::Fetched, name))?;
        }

        let report = validate_package(&mut pkg).map_err(at(Stage::Validated, name))?;
        load_package(self.engine.as_ref(), &mut pkg).map_err(at(Stage::Loaded, name))?;

        let version = pkg.version.clone();
        self.registry.add(pkg);
        info!(name, %version, "installed package");

        Ok(InstallReport {
            name: name.to_string(),
            version,
            stage: Stage::Registered,
            warnings: report.warnings,
        })
    }

    /// Make `name`'s functions available in `target`, installing it first if
    /// it is not loaded yet.
    pub fn import_into(&mut self, name: &str, target: &mut dyn ExecutionContext) -> Result<usize> {
        let loaded = self.registry.find(name).is_some_and(Package::is_loaded);
        if !loaded {
            self.install(name, None)?;
        }
        self.bridge(name, target)
    }

    /// Install every dependency of the current project, continuing past
    /// individual failures.
    pub fn install_dependencies(&mut self) -> Result<InstallSummary> {
        let result = self.require_project().map(|project| {
            project
                .dependencies()
                .iter()
                .map(|d| (d.name.clone(), d.version.clone()))
                .collect::<Vec<_>>()
        });
        let dependencies = self.track(result)?;

        let mut summary = InstallSummary::default();
        for (name, version) in dependencies {
            match self.install(&name, Some(&version)) {
                Ok(_) => summary.installed.push(name),
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }

        info!(
            installed = summary.installed.len(),
            failed = summary.failed.len(),
            "installed project dependencies"
        );
        Ok(summary)
    }

    /// Fetch and validate several `(name, version)` requests on a bounded
    /// worker pool and register them unloaded. Packages already loaded are
    /// left alone.
    pub fn prefetch(&mut self, requests: &[(String, String)]) -> InstallSummary {
        let locator = self.locator();
        let workers = self
            .config
            .max_concurrent_downloads
            .clamp(1, requests.len().max(1));
        let transport = self.transport.as_ref();
        let config = &self.config;

        let (tx, rx) = channel::unbounded::<(String, String)>();
        for request in requests {
            let _ = tx.send(request.clone());
        }
        drop(tx);

        let registry = Mutex::new(&mut self.registry);
        let summary = Mutex::new(InstallSummary::default());

        thread::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                let (registry, summary, locator) = (&registry, &summary, &locator);
                scope.spawn(move || {
                    for (name, version) in rx.iter() {
                        if registry.lock().find(&name).is_some_and(Package::is_loaded) {
                            summary.lock().installed.push(name);
                            continue;
                        }
                        match prefetch_one(locator, transport, config, &name, &version) {
                            Ok(pkg) => {
                                registry.lock().add(pkg);
                                summary.lock().installed.push(name);
                            }
                            Err(e) => {
                                warn!(%name, error = %e, "prefetch failed");
                                summary.lock().failed.push((name, e.to_string()));
                            }
                        }
                    }
                });
            }
        });

        let mut summary = summary.into_inner();
        summary.installed.sort();
        summary.failed.sort();
        if let Some((_, message)) = summary.failed.last() {
            self.last_error = Some(message.clone());
        }
        summary
    }

    /// Publish the package in `pkg.local_path` to the registry.
    ///
    /// The structure and the `EMBER_REGISTRY_TOKEN` token are checked before
    /// any network call. The temporary archive directory is always removed.
    pub fn publish(&mut self, pkg: &Package) -> Result<()> {
        let result = self.run_publish(pkg);
        self.track(result)
    }

    fn run_publish(&self, pkg: &Package) -> Result<()> {
        validate_package_name(&pkg.name)?;
        validate_version(&pkg.version)?;
        let dir = pkg
            .local_path
            .as_deref()
            .ok_or_else(|| PmError::NotFound(format!("no local directory for {}", pkg.name)))?;
        validate_structure(dir)?;

        let token = registry_token()
            .ok_or_else(|| PmError::Auth("EMBER_REGISTRY_TOKEN is not set".to_string()))?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let seq = PUBLISH_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        let scratch = ScratchDir::create(std::env::temp_dir().join(format!(
            "ember-publish-{}-{}-{}",
            stamp,
            std::process::id(),
            seq
        )))?;

        let archive = scratch
            .path
            .join(format!("{}-{}.tar.gz", pkg.name, pkg.version));
        create_tarball(dir, &pkg.name, &archive)?;

        let size = check_archive_size(&archive, &pkg.name, MAX_PUBLISH_ARCHIVE)?;

        let base = &self.config.registry_url;
        let profile = self
            .transport
            .get(endpoint(base, &["auth", "profile"])?.as_str(), Some(token.as_str()))?;
        if profile.status != 200 {
            return Err(PmError::Auth(format!(
                "registry rejected token (status {})",
                profile.status
            )));
        }

        info!(name = %pkg.name, version = %pkg.version, size = %format_size(size), "uploading package");
        let upload = self.transport.upload_file(
            endpoint(base, &["packages"])?.as_str(),
            &archive,
            Some(token.as_str()),
        )?;
        if !upload.is_success() {
            return Err(PmError::Network(format!(
                "upload failed with status {}: {}",
                upload.status, upload.body
            )));
        }

        let check = endpoint(base, &["packages", pkg.name.as_str(), pkg.version.as_str()])?;
        match self.transport.get(check.as_str(), Some(token.as_str())) {
            Ok(r) if r.status == 200 => debug!(name = %pkg.name, "publish verified"),
            Ok(r) => warn!(name = %pkg.name, status = r.status, "could not verify published package"),
            Err(e) => warn!(name = %pkg.name, error = %e, "could not verify published package"),
        }

        info!(name = %pkg.name, version = %pkg.version, "published package");
        Ok(())
    }

    /// Query the registry
    pub fn search(&mut self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let result = self.run_search(query, limit);
        self.track(result)
    }

    fn run_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut url = endpoint(&self.config.registry_url, &["search"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string());

        let token = registry_token();
        let response = self.transport.get(url.as_str(), token.as_deref())?;
        if !response.is_success() {
            return Err(PmError::Network(format!(
                "search failed with status {}",
                response.status
            )));
        }

        let body: SearchBody = serde_json::from_str(&response.body)
            .map_err(|e| PmError::Network(format!("malformed search response: {}", e)))?;
        let mut hits = match body {
            SearchBody::Hits(hits) => hits,
            SearchBody::Wrapped { results } => results,
        };
        hits.truncate(limit);
        Ok(hits)
    }

    /// Unload, unregister and delete an installed package
    pub fn uninstall(&mut self, name: &str) -> Result<()> {
        let result = self.run_uninstall(name);
        self.track(result)
    }

    fn run_uninstall(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        let registered = self.registry.remove(name).is_some();

        let dir = self.config.install_dir.join(name);
        let on_disk = dir.is_dir();
        if on_disk {
            fs::remove_dir_all(&dir).map_err(|e| PmError::io(&dir, e))?;
        }

        if !registered && !on_disk {
            return Err(PmError::NotFound(format!("package {} is not installed", name)));
        }
        info!(name, "uninstalled package");
        Ok(())
    }

    pub fn is_installed(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.config.install_dir.join(name).is_dir()
    }

    /// Names of the packages under the packages root, sorted
    pub fn list_installed(&self) -> Result<Vec<String>> {
        let root = &self.config.install_dir;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PmError::io(root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PmError::io(root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Registry entry for `name`
    pub fn package_info(&self, name: &str) -> Option<&Package> {
        self.registry.find(name)
    }
}
