//! Cross-context function bridge
//!
//! Copies the callables defined by a loaded package into a consuming
//! context. Every export `f` of package `pkg` is always visible as `pkg.f`;
//! the bare name `f` is added only when the consumer has no global by that
//! name yet.

use crate::engine::{EngineError, ExecutionContext, Global};
use crate::error::{PmError, Result};
use crate::package::Package;
use tracing::{debug, info};

fn exports_of(pkg: &Package) -> Result<Vec<Global>> {
    let context = pkg
        .context()
        .ok_or_else(|| PmError::invalid("package", format!("{} is not loaded", pkg.name)))?;
    Ok(context
        .globals()
        .into_iter()
        .filter(Global::is_callable)
        .collect())
}

/// Names of the callables a loaded package exports
pub fn get_exports(pkg: &Package) -> Result<Vec<String>> {
    Ok(exports_of(pkg)?.into_iter().map(|g| g.name).collect())
}

/// Register `pkg`'s exports in `target`, returning how many were bridged.
///
/// Running out of global slots for a namespaced name fails the whole import;
/// for a bare alias it only skips the alias.
pub fn import_functions(pkg: &Package, target: &mut dyn ExecutionContext) -> Result<usize> {
    let exports = exports_of(pkg)?;
    let mut count = 0;

    for export in exports {
        let qualified = format!("{}.{}", pkg.name, export.name);
        target
            .set_global(&qualified, export.value.clone())
            .map_err(|e| match e {
                EngineError::CapacityExceeded => PmError::Capacity(format!(
                    "no room for {} in the target context",
                    qualified
                )),
                EngineError::Evaluation(msg) => PmError::invalid("global", msg),
            })?;
        count += 1;

        if target.has_global(&export.name) {
            debug!(name = %export.name, package = %pkg.name, "bare name taken, keeping namespaced only");
            continue;
        }
        if let Err(e) = target.set_global(&export.name, export.value) {
            debug!(name = %export.name, error = %e, "skipping bare alias");
        }
    }

    if count == 0 {
        return Err(PmError::NotFound(format!(
            "package {} exports no functions",
            pkg.name
        )));
    }

    info!(package = %pkg.name, count, "bridged functions");
    Ok(count)
}
