//! Ember Package Manager Library
//!
//! This crate provides package management for Ember, including:
//! - Semver version parsing and constraint matching
//! - Package name and path safety checks
//! - Project manifest handling (ember.toml) and import scanning
//! - Package fetch, validation, loading and publishing
//! - Bridging package functions into execution contexts
//! - Package functions callable from Ember scripts

pub mod archive;
pub mod bridge;
pub mod config;
pub mod discover;
pub mod engine;
pub mod error;
pub mod installer;
pub mod manifest;
pub mod natives;
pub mod package;
pub mod registry;
pub mod scanner;
pub mod security;
pub mod semver;
pub mod transport;
pub mod validate;

pub use bridge::{get_exports, import_functions};
pub use config::PmConfig;
pub use discover::PackageLocator;
pub use engine::{EngineError, ExecutionContext, ExecutionEngine, Function, Global, NativeFn, Value};
pub use error::{ErrorKind, PmError, Result};
pub use installer::{InstallReport, InstallSummary, PackageSystem, SearchHit, Stage};
pub use manifest::{find_project_root, generate_default, ProjectManifest};
pub use natives::{register_natives, SharedSystem};
pub use package::Package;
pub use registry::PackageRegistry;
pub use scanner::{parse_import, scan_source};
pub use security::{create_directory_recursive, validate_name, validate_package_name};
pub use semver::{compare, satisfies, Constraint, SemverError, Version};
pub use transport::{HttpTransport, OfflineTransport, Response, Transport};
pub use validate::{validate_manifest, validate_structure, ValidationReport};
