//! Script-facing package functions
//!
//! Registers `package_install`, `package_uninstall`, `package_list` and
//! `package_search` as host functions so Ember scripts can drive the package
//! manager. Each function takes one string argument (none for
//! `package_list`); malformed calls return `false` or an empty string.

use crate::engine::{EngineError, ExecutionContext, Value};
use crate::error::{PmError, Result};
use crate::installer::PackageSystem;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Results returned by `package_search`
pub const SEARCH_LIMIT: usize = 20;

/// Shared handle the host functions operate on
pub type SharedSystem = Arc<Mutex<PackageSystem>>;

fn single_str(args: &[Value]) -> Option<&str> {
    match args {
        [Value::Str(s)] => Some(s.as_str()),
        _ => None,
    }
}

/// Run `f` on the system unless it is already in use, which happens when a
/// package script calls back into the package manager while being loaded.
fn with_system<T>(
    system: &SharedSystem,
    call: &str,
    f: impl FnOnce(&mut PackageSystem) -> T,
) -> Option<T> {
    match system.try_lock() {
        Some(mut guard) => Some(f(&mut guard)),
        None => {
            warn!(call, "package manager busy, refusing re-entrant call");
            None
        }
    }
}

fn install(system: &SharedSystem, args: &[Value]) -> Value {
    let Some(name) = single_str(args) else {
        return Value::Bool(false);
    };
    let ok = with_system(system, "package_install", |s| s.install(name, None).is_ok());
    Value::Bool(ok.unwrap_or(false))
}

fn uninstall(system: &SharedSystem, args: &[Value]) -> Value {
    let Some(name) = single_str(args) else {
        return Value::Bool(false);
    };
    let ok = with_system(system, "package_uninstall", |s| s.uninstall(name).is_ok());
    Value::Bool(ok.unwrap_or(false))
}

fn list(system: &SharedSystem) -> Value {
    let text = with_system(system, "package_list", |s| match s.list_installed() {
        Ok(names) if names.is_empty() => "No packages installed".to_string(),
        Ok(names) => names.join(", "),
        Err(e) => {
            debug!(error = %e, "package_list failed");
            String::new()
        }
    });
    Value::Str(text.unwrap_or_default())
}

fn search(system: &SharedSystem, args: &[Value]) -> Value {
    let Some(query) = single_str(args) else {
        return Value::Str(String::new());
    };
    let text = with_system(system, "package_search", |s| {
        let hits = s.search(query, SEARCH_LIMIT).unwrap_or_default();
        if hits.is_empty() {
            return "No packages found".to_string();
        }
        hits.iter()
            .map(|h| format!("{} {} - {}", h.name, h.version, h.description))
            .collect::<Vec<_>>()
            .join("\n")
    });
    Value::Str(text.unwrap_or_else(|| "Package manager not available".to_string()))
}

/// Define the package functions in `target`, returning how many were added.
pub fn register_natives(system: &SharedSystem, target: &mut dyn ExecutionContext) -> Result<usize> {
    let natives = [
        ("package_install", {
            let system = Arc::clone(system);
            Value::native(move |args| install(&system, args))
        }),
        ("package_uninstall", {
            let system = Arc::clone(system);
            Value::native(move |args| uninstall(&system, args))
        }),
        ("package_list", {
            let system = Arc::clone(system);
            Value::native(move |_| list(&system))
        }),
        ("package_search", {
            let system = Arc::clone(system);
            Value::native(move |args| search(&system, args))
        }),
    ];

    let count = natives.len();
    for (name, value) in natives {
        target.set_global(name, value).map_err(|e| match e {
            EngineError::CapacityExceeded => {
                PmError::Capacity(format!("no room for {} in the target context", name))
            }
            EngineError::Evaluation(msg) => PmError::invalid("global", msg),
        })?;
    }

    debug!(count, "registered package functions");
    Ok(count)
}
