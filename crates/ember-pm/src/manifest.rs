//! Project manifest (ember.toml)
//!
//! The manifest is a small line-oriented TOML subset: top-level
//! `key = "value"` metadata followed by an optional `[dependencies]` table of
//! `name = "constraint"` entries. The same tokenizer is used when validating
//! a package's own `package.toml`.

use crate::discover::PackageLocator;
use crate::error::{PmError, Result};
use crate::package::Package;
use crate::security::validate_package_name;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of a project manifest
pub const MANIFEST_FILE: &str = "ember.toml";

/// Header written at the top of every saved manifest
const HEADER: &str = "# Ember Project Configuration\n# Generated automatically - edit with care\n";

const DEFAULT_NAME: &str = "untitled";
const DEFAULT_VERSION: &str = "0.1.0";
const DEFAULT_DESCRIPTION: &str = "A new Ember project";

/// One tokenized manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Comment,
    /// `[name]` header
    Section(&'a str),
    /// Quoted values come back unescaped
    KeyValue { key: &'a str, value: Cow<'a, str> },
    /// Anything else; ignored by readers
    Other(&'a str),
}

/// Read a quoted value up to its first unescaped `"`. `rest` starts just
/// after the opening quote; an unterminated value runs to the end of line.
fn unquote(rest: &str) -> Cow<'_, str> {
    let Some(stop) = rest.find(['"', '\\']) else {
        return Cow::Borrowed(rest);
    };
    if rest.as_bytes()[stop] == b'"' {
        return Cow::Borrowed(&rest[..stop]);
    }

    let mut out = String::from(&rest[..stop]);
    let mut chars = rest[stop..].chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Quote `value` so [`tokenize_line`] reads it back unchanged
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Tokenize a single line.
///
/// Quoted values end at the first unescaped `"` and support `\\`, `\"`,
/// `\n`, `\r` and `\t`; anything after the closing quote is dropped.
/// Unquoted values stop at `#`.
pub fn tokenize_line(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line.starts_with('#') {
        return Line::Comment;
    }
    if let Some(inner) = line.strip_prefix('[') {
        let name = inner.split(']').next().unwrap_or(inner).trim();
        return Line::Section(name);
    }

    let Some((key, value)) = line.split_once('=') else {
        return Line::Other(line);
    };

    let value = value.trim();
    let value = match value.strip_prefix('"') {
        Some(rest) => unquote(rest),
        None => Cow::Borrowed(value.split('#').next().unwrap_or(value).trim()),
    };

    Line::KeyValue {
        key: key.trim(),
        value,
    }
}

/// Tokenize a whole document
pub fn tokenize(content: &str) -> impl Iterator<Item = Line<'_>> {
    content.lines().map(tokenize_line)
}

/// A project's declared metadata and dependencies
#[derive(Debug)]
pub struct ProjectManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    dependencies: Vec<Package>,
}

impl ProjectManifest {
    /// Create an empty manifest
    pub fn init(name: impl Into<String>, version: impl Into<String>) -> Self {
        ProjectManifest {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            dependencies: Vec::new(),
        }
    }

    /// Parse manifest text. Dependency entries with unusable names are
    /// skipped with a warning.
    pub fn parse(content: &str, locator: &PackageLocator) -> Self {
        let mut manifest = ProjectManifest::init(DEFAULT_NAME, DEFAULT_VERSION);
        let mut in_dependencies = false;

        for line in tokenize(content) {
            match line {
                Line::Section(name) => in_dependencies = name == "dependencies",
                Line::KeyValue { key, value } if in_dependencies => {
                    if let Err(e) = manifest.add_dependency(key, &value, locator) {
                        warn!(dependency = key, error = %e, "skipping dependency");
                    }
                }
                Line::KeyValue { key, value } => match key {
                    "name" => manifest.name = value.to_string(),
                    "version" => manifest.version = value.to_string(),
                    "description" => manifest.description = value.to_string(),
                    "author" => manifest.author = value.to_string(),
                    _ => debug!(key, "ignoring unknown manifest key"),
                },
                Line::Blank | Line::Comment | Line::Other(_) => {}
            }
        }

        manifest
    }

    /// Load a manifest from disk
    pub fn load(path: &Path, locator: &PackageLocator) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PmError::io(path, e))?;
        let manifest = Self::parse(&content, locator);
        debug!(
            path = %path.display(),
            dependencies = manifest.dependencies.len(),
            "loaded project manifest"
        );
        Ok(manifest)
    }

    /// Render the manifest in its canonical form
    pub fn to_toml_string(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        out.push_str(&format!("name = {}\n", quote(&self.name)));
        out.push_str(&format!("version = {}\n", quote(&self.version)));
        if !self.description.is_empty() {
            out.push_str(&format!("description = {}\n", quote(&self.description)));
        }
        if !self.author.is_empty() {
            out.push_str(&format!("author = {}\n", quote(&self.author)));
        }

        if !self.dependencies.is_empty() {
            out.push_str("\n[dependencies]\n");
            for dep in &self.dependencies {
                out.push_str(&format!("{} = {}\n", dep.name, quote(&dep.version)));
            }
        }

        out
    }

    /// Write the manifest to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml_string()).map_err(|e| PmError::io(path, e))?;
        info!(path = %path.display(), "saved project manifest");
        Ok(())
    }

    /// Declare or update a dependency.
    ///
    /// An existing entry only has its version replaced. A new entry is
    /// discovered first so its local path or repository URL is known.
    pub fn add_dependency(
        &mut self,
        name: &str,
        version: &str,
        locator: &PackageLocator,
    ) -> Result<()> {
        validate_package_name(name)?;
        let version = version.trim();
        if version.is_empty() {
            return Err(PmError::invalid(
                "version",
                format!("empty constraint for dependency {}", name),
            ));
        }

        if let Some(dep) = self.dependencies.iter_mut().find(|d| d.name == name) {
            debug!(name, from = %dep.version, to = version, "updating dependency");
            dep.version = version.to_string();
            return Ok(());
        }

        let mut dep = locator.discover(name)?;
        dep.version = version.to_string();
        debug!(name, version, "adding dependency");
        self.dependencies.push(dep);
        Ok(())
    }

    /// Remove a dependency, returning whether it was declared
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| d.name != name);
        before != self.dependencies.len()
    }

    pub fn dependency(&self, name: &str) -> Option<&Package> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn dependencies(&self) -> &[Package] {
        &self.dependencies
    }
}

/// Walk up from `start_dir` to the first directory holding an `ember.toml`
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if current.join(MANIFEST_FILE).is_file() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}

/// Write a fresh `ember.toml` into `dir`, named after the directory.
///
/// Fails if the directory already has a manifest.
pub fn generate_default(dir: &Path) -> Result<ProjectManifest> {
    let path = dir.join(MANIFEST_FILE);
    if path.exists() {
        return Err(PmError::invalid(
            "project",
            format!("{} already exists in {}", MANIFEST_FILE, dir.display()),
        ));
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned());

    let mut manifest = ProjectManifest::init(name, DEFAULT_VERSION);
    manifest.description = DEFAULT_DESCRIPTION.to_string();
    manifest.save(&path)?;
    info!(dir = %dir.display(), "generated {}", MANIFEST_FILE);
    Ok(manifest)
}
