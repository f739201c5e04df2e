use crate::backend::Backend;
use crate::backends::{FileBackend, GitBackend, HttpBackend};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Mapping of scheme names to the backend that fetches them. Every client
/// owns its registry, so multiple clients with different backends can coexist.
/// Mutate it before fetching, not while fetches are in flight. Clones share
/// the same backend instances.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: FxHashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create a registry with the built-in backends.
    pub fn new() -> Self {
        let http = Arc::new(HttpBackend::new());
        let mut registry = Self::empty();

        registry.register("file", Arc::new(FileBackend::new()));
        registry.register("git", Arc::new(GitBackend::new()));
        registry.register("http", http.clone());
        registry.register("https", http);
        registry
    }

    /// Create a registry without any backends.
    pub fn empty() -> Self {
        Self {
            backends: FxHashMap::default(),
        }
    }

    /// Register a backend for the scheme, replacing any existing entry.
    pub fn register(&mut self, scheme: impl AsRef<str>, backend: Arc<dyn Backend>) {
        let scheme = scheme.as_ref().to_lowercase();

        trace!(scheme = &scheme, backend = backend.name(), "Registering backend");

        self.backends.insert(scheme, backend);
    }

    pub fn unregister(&mut self, scheme: impl AsRef<str>) -> Option<Arc<dyn Backend>> {
        self.backends.remove(&scheme.as_ref().to_lowercase())
    }

    /// Replace the entire mapping.
    pub fn replace_all<I, S>(&mut self, backends: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn Backend>)>,
        S: AsRef<str>,
    {
        self.backends.clear();

        for (scheme, backend) in backends {
            self.register(scheme, backend);
        }
    }

    pub fn get(&self, scheme: impl AsRef<str>) -> Option<Arc<dyn Backend>> {
        self.backends
            .get(&scheme.as_ref().to_lowercase())
            .cloned()
    }

    pub fn contains(&self, scheme: impl AsRef<str>) -> bool {
        self.backends
            .contains_key(&scheme.as_ref().to_lowercase())
    }

    /// Registered scheme names, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes = self.backends.keys().map(|key| key.as_str()).collect::<Vec<_>>();
        schemes.sort();
        schemes
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
