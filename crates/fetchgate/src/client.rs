use crate::backend::Backend;
use crate::client_error::ClientError;
use crate::context::FetchContext;
use crate::detect::{Detector, FileDetector, detect, has_url_scheme};
use crate::mode::FetchMode;
use crate::owner::{ClientOptions, ClientOwner, OnProgressFn};
use crate::registry::BackendRegistry;
use crate::source::SourceDescriptor;
use starbase_styles::color;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, trace};
use url::Url;

/// A single fetch: where from, where to, and in which mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchRequest {
    pub source: String,
    pub destination: PathBuf,
    pub mode: FetchMode,
}

impl FetchRequest {
    pub fn new(source: impl AsRef<str>, destination: impl AsRef<Path>, mode: FetchMode) -> Self {
        Self {
            source: source.as_ref().to_owned(),
            destination: destination.as_ref().to_path_buf(),
            mode,
        }
    }

    /// Fetch a directory tree into the destination.
    pub fn dir(source: impl AsRef<str>, destination: impl AsRef<Path>) -> Self {
        Self::new(source, destination, FetchMode::Directory)
    }

    /// Fetch a single file to the destination path.
    pub fn file(source: impl AsRef<str>, destination: impl AsRef<Path>) -> Self {
        Self::new(source, destination, FetchMode::File)
    }

    /// Let the backend decide. Files are placed within the destination directory.
    pub fn any(source: impl AsRef<str>, destination: impl AsRef<Path>) -> Self {
        Self::new(source, destination, FetchMode::Any)
    }
}

/// A source after forced scheme extraction, detection, and URL parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSource {
    /// Scheme used to select the backend.
    pub scheme: String,

    /// Whether the scheme was forced with the `scheme::` prefix.
    pub forced: bool,

    pub url: Url,
}

/// Entry point for fetching. Selects a backend by scheme from its own
/// registry, binds it to the shared configuration, and delegates.
pub struct Client {
    detectors: Vec<Arc<dyn Detector>>,
    on_progress: Option<OnProgressFn>,
    options: ClientOptions,
    owner: Arc<ClientOwner>,
    registry: BackendRegistry,
    working_dir: Option<PathBuf>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_registry(BackendRegistry::new())
    }

    /// Create a client that dispatches through the provided registry.
    ///
    /// Backends are rebound to this client's owner at the start of every
    /// fetch. A cloned registry shares its backend instances, so clients
    /// built from clones of one registry rebind the same backends, and a
    /// backend must read its owner before its first await. Give each
    /// client its own backend instances when they fetch concurrently.
    pub fn with_registry(registry: BackendRegistry) -> Self {
        debug!(schemes = ?registry.schemes(), "Creating fetch client");

        Self {
            detectors: vec![Arc::new(FileDetector)],
            on_progress: None,
            options: ClientOptions::default(),
            owner: Arc::new(ClientOwner::default()),
            registry,
            working_dir: None,
        }
    }

    pub fn owner(&self) -> &Arc<ClientOwner> {
        &self.owner
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Override registry entries. Must not happen while fetches are in flight.
    pub fn registry_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    /// Append a detector, tried after the existing ones.
    pub fn add_detector(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn set_options(&mut self, options: ClientOptions) {
        self.options = options;
        self.rebuild_owner();
    }

    pub fn set_progress(&mut self, on_progress: OnProgressFn) {
        self.on_progress = Some(on_progress);
        self.rebuild_owner();
    }

    /// Directory that relative source paths are resolved against.
    pub fn set_working_dir(&mut self, dir: impl AsRef<Path>) {
        self.working_dir = Some(dir.as_ref().to_path_buf());
    }

    /// Turn a raw source string into the scheme and URL used to pick a backend.
    /// Deterministic and free of side effects.
    pub fn resolve_source(&self, source: &str) -> Result<ResolvedSource, ClientError> {
        let descriptor = SourceDescriptor::parse(source);
        let pwd = self.working_dir.as_deref();

        let (scheme, forced, locator) = match descriptor.forced_scheme {
            // A forced scheme selects the backend, detection only qualifies the locator
            Some(scheme) => {
                let locator = if has_url_scheme(&descriptor.locator) {
                    descriptor.locator
                } else {
                    detect(&descriptor.locator, pwd, &self.detectors)?
                };

                (Some(scheme.to_lowercase()), true, locator)
            }
            None => (None, false, detect(&descriptor.locator, pwd, &self.detectors)?),
        };

        let url = Url::parse(&locator).map_err(|error| ClientError::InvalidUrl {
            url: locator.clone(),
            error: Box::new(error),
        })?;

        Ok(ResolvedSource {
            scheme: scheme.unwrap_or_else(|| url.scheme().to_owned()),
            forced,
            url,
        })
    }

    /// Look up the backend for a resolved source.
    pub fn find_backend(
        &self,
        resolved: &ResolvedSource,
        source: &str,
    ) -> Result<Arc<dyn Backend>, ClientError> {
        self.registry
            .get(&resolved.scheme)
            .ok_or_else(|| ClientError::BackendNotFound {
                scheme: resolved.scheme.clone(),
                source_string: source.to_owned(),
            })
    }

    /// Perform the fetch, and return the mode it was performed in.
    #[instrument(skip(self, ctx))]
    pub async fn fetch(
        &self,
        ctx: &FetchContext,
        request: &FetchRequest,
    ) -> Result<FetchMode, ClientError> {
        let resolved = self.resolve_source(&request.source)?;
        let backend = self.find_backend(&resolved, &request.source)?;

        trace!(
            scheme = &resolved.scheme,
            forced = resolved.forced,
            url = resolved.url.as_str(),
            "Resolved source to backend {}",
            backend.name(),
        );

        backend.bind_owner(Arc::clone(&self.owner));

        let ctx = match self.owner.timeout() {
            Some(timeout) => ctx.child().with_timeout(timeout),
            None => ctx.clone(),
        };

        let mut destination = request.destination.clone();

        let mode = if request.mode.is_resolved() {
            request.mode
        } else {
            let mode = backend.resolve_mode(&ctx, &resolved.url).await?;

            if !mode.is_resolved() {
                return Err(ClientError::UnresolvedMode {
                    scheme: resolved.scheme,
                    url: resolved.url.to_string(),
                });
            }

            // The destination is a directory, so files are placed within it
            if mode == FetchMode::File {
                let file_name = resolved
                    .url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| ClientError::MissingFileName {
                        url: resolved.url.to_string(),
                    })?;

                destination = destination.join(file_name);
            }

            mode
        };

        debug!(
            scheme = &resolved.scheme,
            mode = %mode,
            dest = ?destination,
            "Fetching {} into {}",
            color::url(resolved.url.as_str()),
            color::path(&destination),
        );

        match mode {
            FetchMode::File => {
                backend
                    .get_file(&ctx, &destination, &resolved.url)
                    .await?
            }
            _ => backend.get(&ctx, &destination, &resolved.url).await?,
        };

        Ok(mode)
    }

    /// Fetch the directory at `source` into `dest`, updating it if it exists.
    pub async fn get_dir(
        &self,
        ctx: &FetchContext,
        dest: impl AsRef<Path>,
        source: impl AsRef<str>,
    ) -> Result<(), ClientError> {
        self.fetch(ctx, &FetchRequest::dir(source, dest)).await?;

        Ok(())
    }

    /// Fetch the single file at `source` to the `dest` path.
    pub async fn get_file(
        &self,
        ctx: &FetchContext,
        dest: impl AsRef<Path>,
        source: impl AsRef<str>,
    ) -> Result<(), ClientError> {
        self.fetch(ctx, &FetchRequest::file(source, dest)).await?;

        Ok(())
    }

    /// Fetch a file or directory into the `dest` directory, as decided by the backend.
    pub async fn get_any(
        &self,
        ctx: &FetchContext,
        dest: impl AsRef<Path>,
        source: impl AsRef<str>,
    ) -> Result<FetchMode, ClientError> {
        self.fetch(ctx, &FetchRequest::any(source, dest)).await
    }

    fn rebuild_owner(&mut self) {
        let mut owner = ClientOwner::new(self.options.clone());

        if let Some(on_progress) = &self.on_progress {
            owner = owner.with_progress(Arc::clone(on_progress));
        }

        self.owner = Arc::new(owner);
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}
