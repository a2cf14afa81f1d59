//! Name and path safety checks
//!
//! Every package name must pass [`validate_name`] before it is joined onto a
//! filesystem path or handed to the archive layer.

use crate::error::{PmError, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Maximum length of a package name in bytes
pub const MAX_NAME_LEN: usize = 64;

/// Characters that may never appear in a name or a managed path
const DANGEROUS_CHARS: &[char] = &['<', '>', '|', '&', ';', '$', '`'];

/// Validate a package name before it is used in any path.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PmError::invalid("package name", "name is empty"));
    }

    if name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains(DANGEROUS_CHARS)
    {
        warn!(name, "rejected package name with dangerous characters");
        return Err(PmError::Security(format!(
            "package name contains dangerous characters: {}",
            name
        )));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(PmError::invalid(
            "package name",
            format!("name longer than {} bytes: {}", MAX_NAME_LEN, name),
        ));
    }

    Ok(())
}

/// Create `path` and all missing parents, one component at a time.
///
/// The whole path is rejected up front if it contains `..` or any character
/// from the dangerous set. Components that already exist as directories are
/// accepted; any other failure aborts.
pub fn create_directory_recursive(path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(PmError::invalid("path", "path is empty"));
    }

    if text.contains("..") || text.contains(DANGEROUS_CHARS) {
        warn!(path = %text, "rejected directory path with dangerous characters");
        return Err(PmError::Security(format!(
            "path contains dangerous characters: {}",
            text
        )));
    }

    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        if matches!(component, Component::RootDir | Component::Prefix(_)) {
            continue;
        }

        match fs::create_dir(&current) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
            Err(e) => return Err(PmError::io(&current, e)),
        }
    }

    Ok(())
}

/// Strict identifier check: `[A-Za-z0-9_-]`, non-empty, shorter than 128 bytes.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() < 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Full check for a package name: [`validate_name`] plus the identifier
/// charset, so the name is also safe as a manifest key.
pub fn validate_package_name(name: &str) -> Result<()> {
    validate_name(name)?;
    if !is_valid_identifier(name) {
        return Err(PmError::invalid(
            "package name",
            format!("only letters, digits, '-' and '_' are allowed: {}", name),
        ));
    }
    Ok(())
}

/// Loose version-string check used before a version is stored or sent.
pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() >= 32 {
        return Err(PmError::invalid(
            "version",
            format!("version must be 1-31 bytes: '{}'", version),
        ));
    }
    if version.contains("..") {
        return Err(PmError::invalid(
            "version",
            format!("version contains '..': {}", version),
        ));
    }
    Ok(())
}

/// Format a byte count for humans: `512 B`, `1.5 KB`, `20.0 MB`, `1.2 GB`.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}
