//! In-memory package registry

use crate::package::Package;
use tracing::debug;

/// Ordered catalog of known packages, unique by name.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: Vec<Package>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `pkg`, replacing (and unloading) any entry with the same name.
    pub fn add(&mut self, pkg: Package) {
        match self.packages.iter_mut().find(|p| p.name == pkg.name) {
            Some(existing) => {
                debug!(name = %pkg.name, version = %pkg.version, "replacing registry entry");
                // Drop of the old value disposes its context
                *existing = pkg;
            }
            None => {
                debug!(name = %pkg.name, version = %pkg.version, "registering package");
                self.packages.push(pkg);
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Remove and return the entry named `name`
    pub fn remove(&mut self, name: &str) -> Option<Package> {
        let index = self.packages.iter().position(|p| p.name == name)?;
        Some(self.packages.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Unload every package and empty the registry
    pub fn cleanup(&mut self) {
        for pkg in &mut self.packages {
            pkg.unload();
        }
        self.packages.clear();
    }
}

impl Drop for PackageRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}
