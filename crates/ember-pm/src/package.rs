//! Package record

use crate::engine::ExecutionContext;
use std::fmt;
use std::path::PathBuf;

/// A known package, possibly loaded into its own execution context.
///
/// The context handle is present exactly when the package is loaded. Copies
/// made with [`Package::record`] never carry a handle, which is how the
/// project manifest keeps its own dependency records.
pub struct Package {
    pub name: String,
    pub version: String,
    /// Local package directory, once fetched or discovered on disk
    pub local_path: Option<PathBuf>,
    /// Remote location, for packages that still need fetching
    pub repository_url: Option<String>,
    pub verified: bool,
    /// Reserved for archive checksums; never verified
    pub checksum: Option<String>,
    handle: Option<Box<dyn ExecutionContext>>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            version: version.into(),
            local_path: None,
            repository_url: None,
            verified: false,
            checksum: None,
            handle: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Attach a context, disposing any previous one
    pub fn attach(&mut self, context: Box<dyn ExecutionContext>) {
        if let Some(old) = self.handle.replace(context) {
            old.dispose();
        }
    }

    pub fn context(&self) -> Option<&dyn ExecutionContext> {
        self.handle.as_deref()
    }

    pub fn context_mut(&mut self) -> Option<&mut (dyn ExecutionContext + 'static)> {
        self.handle.as_deref_mut()
    }

    /// Dispose the execution context, if any
    pub fn unload(&mut self) {
        if let Some(context) = self.handle.take() {
            context.dispose();
        }
    }

    /// Handle-free copy of this package's metadata
    pub fn record(&self) -> Package {
        Package {
            name: self.name.clone(),
            version: self.version.clone(),
            local_path: self.local_path.clone(),
            repository_url: self.repository_url.clone(),
            verified: self.verified,
            checksum: self.checksum.clone(),
            handle: None,
        }
    }
}

impl Drop for Package {
    fn drop(&mut self) {
        self.unload();
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("local_path", &self.local_path)
            .field("repository_url", &self.repository_url)
            .field("verified", &self.verified)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, Global, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingContext(Arc<AtomicUsize>);

    impl ExecutionContext for CountingContext {
        fn evaluate(&mut self, _source: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn globals(&self) -> Vec<Global> {
            Vec::new()
        }
        fn set_global(&mut self, _name: &str, _value: Value) -> Result<(), EngineError> {
            Ok(())
        }
        fn dispose(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_unload_disposes_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut pkg = Package::new("logger", "1.0.0");
        pkg.attach(Box::new(CountingContext(disposed.clone())));
        assert!(pkg.is_loaded());

        pkg.unload();
        pkg.unload();
        drop(pkg);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_record_has_no_handle() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut pkg = Package::new("logger", "1.0.0");
        pkg.verified = true;
        pkg.attach(Box::new(CountingContext(disposed.clone())));

        let copy = pkg.record();
        assert!(!copy.is_loaded());
        assert!(copy.verified);
        drop(copy);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }
}
