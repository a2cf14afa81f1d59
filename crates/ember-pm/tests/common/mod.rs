//! Shared fixtures for pipeline tests: a toy engine, an in-memory registry
//! transport and package builders.

#![allow(dead_code)]

use ember_pm::archive::create_tarball;
use ember_pm::engine::{EngineError, ExecutionContext, ExecutionEngine, Function, Global, Value};
use ember_pm::{PmConfig, PmError, Response, Result, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const REGISTRY: &str = "https://registry.test";

/// Context understanding two statements: `fn name(...)` defines a function
/// and `let name` defines a number. A line reading `fail!` aborts evaluation.
pub struct ToyContext {
    globals: Vec<Global>,
    capacity: Option<usize>,
    disposed: Arc<AtomicUsize>,
}

impl ExecutionContext for ToyContext {
    fn evaluate(&mut self, source: &str) -> std::result::Result<(), EngineError> {
        for line in source.lines().map(str::trim) {
            if line == "fail!" {
                return Err(EngineError::Evaluation("script aborted".to_string()));
            }
            if let Some(rest) = line.strip_prefix("fn ") {
                let name = rest.split('(').next().unwrap_or(rest).trim();
                let value = Value::Function(Arc::new(Function {
                    name: name.to_string(),
                    arity: 0,
                }));
                self.set_global(name, value)?;
            } else if let Some(name) = line.strip_prefix("let ") {
                self.set_global(name.trim(), Value::Number(1.0))?;
            }
        }
        Ok(())
    }

    fn globals(&self) -> Vec<Global> {
        self.globals.clone()
    }

    fn set_global(&mut self, name: &str, value: Value) -> std::result::Result<(), EngineError> {
        if let Some(existing) = self.globals.iter_mut().find(|g| g.name == name) {
            existing.value = value;
            return Ok(());
        }
        if self.capacity.is_some_and(|cap| self.globals.len() >= cap) {
            return Err(EngineError::CapacityExceeded);
        }
        self.globals.push(Global {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct ToyEngine {
    pub disposed: Arc<AtomicUsize>,
    pub created: Arc<AtomicUsize>,
}

impl ToyEngine {
    pub fn context(&self, capacity: Option<usize>) -> ToyContext {
        ToyContext {
            globals: Vec::new(),
            capacity,
            disposed: Arc::clone(&self.disposed),
        }
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ExecutionEngine for ToyEngine {
    fn new_context(&self) -> Box<dyn ExecutionContext> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(self.context(None))
    }
}

#[derive(Default)]
struct Registry {
    archives: HashMap<String, Vec<u8>>,
    /// Downloads written as sparse files of the given length
    sized: HashMap<String, u64>,
    pages: HashMap<String, Response>,
    uploads: Vec<(String, Vec<u8>)>,
    requests: Vec<String>,
}

/// Registry served from memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Registry>>,
}

impl MemoryTransport {
    pub fn serve_archive(&self, url: &str, bytes: Vec<u8>) {
        self.inner.lock().archives.insert(url.to_string(), bytes);
    }

    pub fn serve_sized(&self, url: &str, len: u64) {
        self.inner.lock().sized.insert(url.to_string(), len);
    }

    pub fn serve_page(&self, url: &str, status: u16, body: &str) {
        self.inner.lock().pages.insert(
            url.to_string(),
            Response {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().uploads.clone()
    }

    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().requests.clone()
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str, _token: Option<&str>) -> Result<Response> {
        let mut inner = self.inner.lock();
        inner.requests.push(format!("GET {}", url));
        Ok(inner.pages.get(url).cloned().unwrap_or(Response {
            status: 404,
            body: String::new(),
        }))
    }

    fn download_file(&self, url: &str, dest: &Path, _token: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.requests.push(format!("DOWNLOAD {}", url));
        if let Some(&len) = inner.sized.get(url) {
            let file = File::create(dest).map_err(|e| PmError::io(dest, e))?;
            return file.set_len(len).map_err(|e| PmError::io(dest, e));
        }
        let bytes = inner
            .archives
            .get(url)
            .cloned()
            .ok_or_else(|| PmError::Network(format!("download failed with status 404: {}", url)))?;
        fs::write(dest, bytes).map_err(|e| PmError::io(dest, e))
    }

    fn upload_file(&self, url: &str, file: &Path, _token: Option<&str>) -> Result<Response> {
        let bytes = fs::read(file).map_err(|e| PmError::io(file, e))?;
        let mut inner = self.inner.lock();
        inner.requests.push(format!("UPLOAD {}", url));
        inner.uploads.push((url.to_string(), bytes));
        Ok(Response {
            status: 201,
            body: "{}".to_string(),
        })
    }
}

/// Write a package directory holding `files`
pub fn write_package(dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

/// Gzipped tarball of a package, laid out as the registry serves it
pub fn package_archive(name: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    write_package(&src, files);
    let archive = temp.path().join("out.tar.gz");
    create_tarball(&src, name, &archive).unwrap();
    fs::read(archive).unwrap()
}

pub fn download_url(name: &str, version: &str) -> String {
    format!("{}/download/{}/{}", REGISTRY, name, version)
}

pub fn config(packages_root: PathBuf) -> PmConfig {
    PmConfig {
        registry_url: REGISTRY.to_string(),
        install_dir: packages_root,
        max_concurrent_downloads: 2,
        ..PmConfig::default()
    }
}
