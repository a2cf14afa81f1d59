//! Package manager configuration

use crate::error::{PmError, Result};
use crate::security::create_directory_recursive;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default package registry
pub const DEFAULT_REGISTRY: &str = "https://packages.ember-lang.org";

/// Environment variable holding the registry bearer token
pub const TOKEN_ENV: &str = "EMBER_REGISTRY_TOKEN";

/// Base directory for defaults: `$HOME`, falling back to `/tmp`
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Registry token from the environment, if set and non-empty
pub fn registry_token() -> Option<String> {
    env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
}

/// Default location of the saved configuration
pub fn default_config_path() -> PathBuf {
    home_dir().join(".ember").join("package_config.json")
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_cache_dir() -> PathBuf {
    home_dir().join(".ember").join("cache")
}

fn default_install_dir() -> PathBuf {
    home_dir().join(".ember").join("packages")
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_downloads() -> usize {
    3
}

fn default_connection_timeout() -> u64 {
    30
}

/// Settings shared by every pipeline operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmConfig {
    #[serde(default = "default_registry")]
    pub registry_url: String,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Packages root; each package lives in `<install_dir>/<name>`
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    #[serde(default)]
    pub auto_update: bool,

    /// Placeholder; archives are not checksummed against the registry yet
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            registry_url: default_registry(),
            cache_dir: default_cache_dir(),
            install_dir: default_install_dir(),
            auto_update: false,
            verify_checksums: true,
            max_concurrent_downloads: default_max_concurrent_downloads(),
            connection_timeout: default_connection_timeout(),
        }
    }
}

impl PmConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| PmError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| PmError::invalid("config", format!("{}: {}", path.display(), e)))
    }

    /// Save configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_directory_recursive(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PmError::invalid("config", e.to_string()))?;
        fs::write(path, content).map_err(|e| PmError::io(path, e))?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }
}
