//! Package functions called the way an Ember script would call them

mod common;

use common::*;
use ember_pm::engine::{ExecutionContext, Value};
use ember_pm::{register_natives, ErrorKind, PackageSystem, SharedSystem};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn shared(temp: &TempDir, transport: &MemoryTransport) -> (SharedSystem, PathBuf) {
    let root = temp.path().join("packages");
    let system = PackageSystem::new(
        config(root.clone()),
        Box::new(transport.clone()),
        Box::new(ToyEngine::default()),
    );
    (Arc::new(Mutex::new(system)), root)
}

fn call(context: &ToyContext, name: &str, args: &[Value]) -> Value {
    let global = context
        .globals()
        .into_iter()
        .find(|g| g.name == name)
        .unwrap_or_else(|| panic!("{} not registered", name));
    match global.value {
        Value::Native(f) => f(args),
        other => panic!("{} is not a host function: {:?}", name, other),
    }
}

fn text(value: Value) -> String {
    match value {
        Value::Str(s) => s,
        other => panic!("expected a string, got {:?}", other),
    }
}

fn str_arg(s: &str) -> Vec<Value> {
    vec![Value::Str(s.to_string())]
}

#[test]
fn test_install_list_uninstall_from_script() {
    let temp = TempDir::new().unwrap();
    let transport = MemoryTransport::default();
    let (system, root) = shared(&temp, &transport);
    write_package(&root.join("greet"), &[("package.ember", "fn greet(name)\n")]);

    let mut context = ToyEngine::default().context(None);
    assert_eq!(register_natives(&system, &mut context).unwrap(), 4);

    assert!(matches!(call(&context, "package_install", &str_arg("greet")), Value::Bool(true)));
    assert!(system.lock().package_info("greet").unwrap().is_loaded());
    assert_eq!(text(call(&context, "package_list", &[])), "greet");

    assert!(matches!(call(&context, "package_uninstall", &str_arg("greet")), Value::Bool(true)));
    assert_eq!(text(call(&context, "package_list", &[])), "No packages installed");
    assert!(matches!(call(&context, "package_uninstall", &str_arg("greet")), Value::Bool(false)));
}

#[test]
fn test_malformed_calls() {
    let temp = TempDir::new().unwrap();
    let (system, _root) = shared(&temp, &MemoryTransport::default());
    let mut context = ToyEngine::default().context(None);
    register_natives(&system, &mut context).unwrap();

    assert!(matches!(call(&context, "package_install", &[]), Value::Bool(false)));
    assert!(matches!(
        call(&context, "package_install", &[Value::Number(1.0)]),
        Value::Bool(false)
    ));
    assert!(matches!(call(&context, "package_install", &str_arg("bad;name")), Value::Bool(false)));
    assert_eq!(text(call(&context, "package_search", &[])), "");
}

#[test]
fn test_search_from_script() {
    let temp = TempDir::new().unwrap();
    let transport = MemoryTransport::default();
    transport.serve_page(
        "https://registry.test/search?q=json&limit=20",
        200,
        r#"[{"name": "json-parser", "version": "2.0.0", "description": "JSON"},
            {"name": "json-schema", "version": "0.3.1", "description": "Schemas"}]"#,
    );
    let (system, _root) = shared(&temp, &transport);
    let mut context = ToyEngine::default().context(None);
    register_natives(&system, &mut context).unwrap();

    assert_eq!(
        text(call(&context, "package_search", &str_arg("json"))),
        "json-parser 2.0.0 - JSON\njson-schema 0.3.1 - Schemas"
    );
    assert_eq!(
        text(call(&context, "package_search", &str_arg("nothing"))),
        "No packages found"
    );
}

#[test]
fn test_calls_while_system_is_busy() {
    let temp = TempDir::new().unwrap();
    let (system, root) = shared(&temp, &MemoryTransport::default());
    write_package(&root.join("greet"), &[("package.ember", "fn greet(name)\n")]);
    let mut context = ToyEngine::default().context(None);
    register_natives(&system, &mut context).unwrap();

    let _held = system.lock();
    assert!(matches!(call(&context, "package_install", &str_arg("greet")), Value::Bool(false)));
    assert_eq!(
        text(call(&context, "package_search", &str_arg("greet"))),
        "Package manager not available"
    );
}

#[test]
fn test_register_into_full_context() {
    let temp = TempDir::new().unwrap();
    let (system, _root) = shared(&temp, &MemoryTransport::default());
    let mut context = ToyEngine::default().context(Some(2));

    let err = register_natives(&system, &mut context).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);
}
