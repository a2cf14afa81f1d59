//! Package structure and manifest validation

use crate::error::{PmError, Result};
use crate::manifest::{tokenize, Line};
use crate::semver::Version;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Primary script of every package
pub const SCRIPT_FILE: &str = "package.ember";

/// Optional package manifest
pub const PACKAGE_MANIFEST_FILE: &str = "package.toml";

/// Largest script that will be validated or loaded
pub const MAX_SCRIPT_SIZE: u64 = 1024 * 1024;

/// Non-fatal findings from [`validate_structure`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub has_manifest: bool,
    pub warnings: Vec<String>,
}

/// Read a package's primary script, enforcing the size limit
pub fn read_script(package_dir: &Path) -> Result<String> {
    let script = package_dir.join(SCRIPT_FILE);
    let meta = fs::metadata(&script).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            PmError::NotFound(format!("{} in {}", SCRIPT_FILE, package_dir.display()))
        }
        _ => PmError::io(&script, e),
    })?;

    if meta.len() > MAX_SCRIPT_SIZE {
        return Err(PmError::ResourceLimit {
            what: script.display().to_string(),
            size: meta.len(),
            max: MAX_SCRIPT_SIZE,
        });
    }

    fs::read_to_string(&script).map_err(|e| PmError::io(&script, e))
}

fn has_key(content: &str, wanted: &str) -> bool {
    tokenize(content).any(|line| matches!(line, Line::KeyValue { key, .. } if key == wanted))
}

/// Check that `package_dir` holds a loadable package.
pub fn validate_structure(package_dir: &Path) -> Result<ValidationReport> {
    debug!(path = %package_dir.display(), "validating package structure");
    let mut report = ValidationReport::default();

    let source = read_script(package_dir)?;

    let manifest_path = package_dir.join(PACKAGE_MANIFEST_FILE);
    if manifest_path.is_file() {
        report.has_manifest = true;
        let content =
            fs::read_to_string(&manifest_path).map_err(|e| PmError::io(&manifest_path, e))?;
        if !has_key(&content, "name") || !has_key(&content, "version") {
            return Err(PmError::invalid(
                "package manifest",
                format!("{} must declare name and version", manifest_path.display()),
            ));
        }
    } else {
        report.warnings.push(format!("no {} found", PACKAGE_MANIFEST_FILE));
    }

    let count = |c: char| source.chars().filter(|&x| x == c).count();
    if count('{') != count('}') || count('(') != count(')') {
        return Err(PmError::invalid(
            "package script",
            format!("unmatched braces or parentheses in {}", SCRIPT_FILE),
        ));
    }

    if source.len() > 10 && !["print", "fn", "import"].iter().any(|k| source.contains(k)) {
        report
            .warnings
            .push("no recognizable Ember syntax found".to_string());
    }

    for warning in &report.warnings {
        warn!(path = %package_dir.display(), "{}", warning);
    }
    Ok(report)
}

/// Read `name` and `version` from a package directory's `package.toml`
pub fn package_identity(package_dir: &Path) -> Result<(String, String)> {
    let path = package_dir.join(PACKAGE_MANIFEST_FILE);
    let content = fs::read_to_string(&path).map_err(|e| PmError::io(&path, e))?;

    let (mut name, mut version) = (None, None);
    for line in tokenize(&content) {
        match line {
            Line::Section(_) => break,
            Line::KeyValue { key: "name", value } => name = Some(value.into_owned()),
            Line::KeyValue { key: "version", value } => version = Some(value.into_owned()),
            _ => {}
        }
    }

    match (name, version) {
        (Some(name), Some(version)) => Ok((name, version)),
        _ => Err(PmError::invalid(
            "package manifest",
            format!("{} must declare name and version", path.display()),
        )),
    }
}

/// Validate the text of a `package.toml`.
pub fn validate_manifest(content: &str) -> Result<()> {
    for key in ["name", "version"] {
        if !has_key(content, key) {
            return Err(PmError::invalid(
                "package manifest",
                format!("missing required '{}' field", key),
            ));
        }
    }

    let mut depth: i64 = 0;
    for line in content.lines() {
        let mut in_string = false;
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            match c {
                '#' if !in_string => break,
                '\\' if in_string => {
                    chars.next();
                }
                '"' => in_string = !in_string,
                '[' if !in_string => depth += 1,
                ']' if !in_string => depth -= 1,
                _ => {}
            }
        }
    }
    if depth != 0 {
        return Err(PmError::invalid("package manifest", "unmatched brackets"));
    }

    if content.contains("../") || content.contains("..\\") {
        warn!("path traversal pattern in package manifest");
        return Err(PmError::Security(
            "path traversal pattern in package manifest".to_string(),
        ));
    }

    let version = tokenize(content).find_map(|line| match line {
        Line::KeyValue { key: "version", value } => Some(value),
        _ => None,
    });
    if let Some(version) = version {
        Version::parse(&version)?;
    }

    Ok(())
}
