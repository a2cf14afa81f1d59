//! Package discovery
//!
//! Decides whether a package is already present under the packages root or
//! has to be fetched from the registry.

use crate::error::Result;
use crate::package::Package;
use crate::security::validate_package_name;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version reported for packages found on disk
pub const LOCAL_VERSION: &str = "local";

/// Locates packages on disk or in the remote registry
#[derive(Debug, Clone)]
pub struct PackageLocator {
    pub packages_root: PathBuf,
    pub registry_url: String,
}

impl PackageLocator {
    pub fn new(packages_root: impl Into<PathBuf>, registry_url: impl Into<String>) -> Self {
        Self {
            packages_root: packages_root.into(),
            registry_url: registry_url.into(),
        }
    }

    /// Directory a package named `name` lives in once installed
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_root.join(name)
    }

    pub fn packages_root(&self) -> &Path {
        &self.packages_root
    }

    /// Build a package record for `name`.
    ///
    /// A package already installed locally comes back verified with version
    /// `local` and its directory set. Anything else points at the registry
    /// with version `latest`.
    pub fn discover(&self, name: &str) -> Result<Package> {
        validate_package_name(name)?;

        let dir = self.package_dir(name);
        let mut pkg;
        if dir.is_dir() {
            debug!(name, path = %dir.display(), "found local package");
            pkg = Package::new(name, LOCAL_VERSION);
            pkg.local_path = Some(dir);
            pkg.verified = true;
        } else {
            let url = format!("{}/{}", self.registry_url.trim_end_matches('/'), name);
            debug!(name, %url, "package not installed, using registry");
            pkg = Package::new(name, crate::semver::LATEST);
            pkg.repository_url = Some(url);
        }

        Ok(pkg)
    }
}
