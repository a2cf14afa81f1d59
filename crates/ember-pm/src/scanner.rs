//! Import scanner
//!
//! Finds `import name[@constraint]` lines in Ember source and records them
//! as project dependencies.

use crate::discover::PackageLocator;
use crate::error::{PmError, Result};
use crate::manifest::ProjectManifest;
use crate::semver::LATEST;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Parse one source line. Returns `(name, constraint)` for import lines.
///
/// Only lines beginning with `import ` count. A missing `@constraint` means
/// `latest`. Comments and any further tokens on the line are dropped.
pub fn parse_import(line: &str) -> Option<(&str, &str)> {
    let spec = line.strip_prefix("import ")?.trim_start();
    let spec = spec.split('#').next().unwrap_or(spec);
    let spec = spec.split_whitespace().next()?;

    let (name, version) = match spec.split_once('@') {
        Some((name, version)) if !version.is_empty() => (name, version),
        Some((name, _)) => (name, LATEST),
        None => (spec, LATEST),
    };

    if name.is_empty() {
        return None;
    }
    Some((name, version))
}

/// Record every import in `source` into `manifest`, returning how many were
/// recorded. Imports with unusable names are skipped.
pub fn scan_source(source: &str, manifest: &mut ProjectManifest, locator: &PackageLocator) -> usize {
    let mut found = 0;

    for (lineno, line) in source.lines().enumerate() {
        let Some((name, version)) = parse_import(line) else {
            continue;
        };

        match manifest.add_dependency(name, version, locator) {
            Ok(()) => {
                debug!(name, version, line = lineno + 1, "found import");
                found += 1;
            }
            Err(e) => warn!(name, line = lineno + 1, error = %e, "skipping import"),
        }
    }

    found
}

impl ProjectManifest {
    /// Scan a script file for imports and record them as dependencies
    pub fn scan_imports(&mut self, script: &Path, locator: &PackageLocator) -> Result<usize> {
        let source = fs::read_to_string(script).map_err(|e| PmError::io(script, e))?;
        let found = scan_source(&source, self, locator);
        info!(script = %script.display(), found, "scanned imports");
        Ok(found)
    }
}
