//! Package manager error types.

use std::path::PathBuf;

/// Coarse classification of a [`PmError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Io,
    ResourceLimit,
    Security,
    Network,
    Auth,
    Capacity,
}

/// Errors that can occur anywhere in the package pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PmError {
    /// Bad name, version, path or constraint syntax
    #[error("Invalid {what}: {detail}")]
    Validation { what: &'static str, detail: String },

    /// Package, dependency or file absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// File open/read/write/stat failure
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Size limit exceeded
    #[error("{what} too large: {size} bytes (max: {max})")]
    ResourceLimit { what: String, size: u64, max: u64 },

    /// Dangerous character or traversal pattern
    #[error("Security check failed: {0}")]
    Security(String),

    /// Transport failure or non-success status
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or rejected token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Registry or global table full
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Failure inside a specific pipeline stage
    #[error("{package}: {stage} failed: {source}")]
    Stage {
        package: String,
        stage: crate::installer::Stage,
        #[source]
        source: Box<PmError>,
    },
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PmError>;

impl PmError {
    /// Build an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PmError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a validation error
    pub fn invalid(what: &'static str, detail: impl Into<String>) -> Self {
        PmError::Validation {
            what,
            detail: detail.into(),
        }
    }

    /// Classify this error. Stage wrappers report their underlying cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PmError::Validation { .. } => ErrorKind::Validation,
            PmError::NotFound(_) => ErrorKind::NotFound,
            PmError::Io { .. } => ErrorKind::Io,
            PmError::ResourceLimit { .. } => ErrorKind::ResourceLimit,
            PmError::Security(_) => ErrorKind::Security,
            PmError::Network(_) => ErrorKind::Network,
            PmError::Auth(_) => ErrorKind::Auth,
            PmError::Capacity(_) => ErrorKind::Capacity,
            PmError::Stage { source, .. } => source.kind(),
        }
    }
}

impl From<crate::semver::SemverError> for PmError {
    fn from(err: crate::semver::SemverError) -> Self {
        PmError::invalid("version", err.to_string())
    }
}
