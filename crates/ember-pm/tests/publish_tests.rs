//! Publishing against an in-memory registry
//!
//! Every test here runs with a registry token in the environment.

mod common;

use common::*;
use ember_pm::archive::extract_stripped;
use ember_pm::config::TOKEN_ENV;
use ember_pm::{ErrorKind, Package, PackageSystem};
use std::fs;
use tempfile::TempDir;

fn system(transport: &MemoryTransport, temp: &TempDir) -> PackageSystem {
    std::env::set_var(TOKEN_ENV, "test-token");
    PackageSystem::new(
        config(temp.path().join("packages")),
        Box::new(transport.clone()),
        Box::new(ToyEngine::default()),
    )
}

fn local_package(temp: &TempDir, files: &[(&str, &str)]) -> Package {
    let dir = temp.path().join("greet");
    write_package(&dir, files);
    let mut pkg = Package::new("greet", "1.0.0");
    pkg.local_path = Some(dir);
    pkg
}

#[test]
fn test_publish_uploads_fetchable_archive() {
    let temp = TempDir::new().unwrap();
    let transport = MemoryTransport::default();
    transport.serve_page(&format!("{}/auth/profile", REGISTRY), 200, "{}");
    transport.serve_page(&format!("{}/packages/greet/1.0.0", REGISTRY), 200, "{}");

    let pkg = local_package(
        &temp,
        &[
            ("package.ember", "fn greet(name)\n"),
            ("package.toml", "name = \"greet\"\nversion = \"1.0.0\"\n"),
        ],
    );
    let mut system = system(&transport, &temp);
    system.publish(&pkg).unwrap();

    assert_eq!(
        transport.requests(),
        vec![
            format!("GET {}/auth/profile", REGISTRY),
            format!("UPLOAD {}/packages", REGISTRY),
            format!("GET {}/packages/greet/1.0.0", REGISTRY),
        ]
    );

    // The uploaded archive unpacks the same way a fetched one does
    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 1);
    let archive = temp.path().join("uploaded.tar.gz");
    fs::write(&archive, &uploads[0].1).unwrap();
    let out = temp.path().join("unpacked");
    assert_eq!(extract_stripped(&archive, &out).unwrap(), 2);
    assert_eq!(
        fs::read_to_string(out.join("package.ember")).unwrap(),
        "fn greet(name)\n"
    );
}

#[test]
fn test_publish_with_unverified_upload_still_succeeds() {
    let temp = TempDir::new().unwrap();
    let transport = MemoryTransport::default();
    transport.serve_page(&format!("{}/auth/profile", REGISTRY), 200, "{}");

    let pkg = local_package(&temp, &[("package.ember", "fn greet(name)\n")]);
    let mut system = system(&transport, &temp);
    system.publish(&pkg).unwrap();
    assert_eq!(transport.uploads().len(), 1);
}

#[test]
fn test_publish_rejected_token() {
    let temp = TempDir::new().unwrap();
    let transport = MemoryTransport::default();
    transport.serve_page(&format!("{}/auth/profile", REGISTRY), 401, "");

    let pkg = local_package(&temp, &[("package.ember", "fn greet(name)\n")]);
    let mut system = system(&transport, &temp);
    let err = system.publish(&pkg).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(transport.uploads().is_empty());
    assert!(system.last_error().is_some());
}

#[test]
fn test_publish_checks_structure_before_network() {
    let temp = TempDir::new().unwrap();
    let transport = MemoryTransport::default();

    let pkg = local_package(&temp, &[("README", "no script here")]);
    let mut system = system(&transport, &temp);
    let err = system.publish(&pkg).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(transport.requests().is_empty());

    let mut unnamed = Package::new("bad name;", "1.0.0");
    unnamed.local_path = pkg.local_path.clone();
    assert_eq!(
        system.publish(&unnamed).unwrap_err().kind(),
        ErrorKind::Security
    );
}
