use crate::http::{HttpClientError, HttpOptions, create_http_client_with_options};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Called with the bytes transferred so far, and the total when known.
pub type OnProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Shared configuration that every backend bound to a client reads from.
/// Can be nested within an application's own configuration file.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientOptions {
    /// Mode used when creating parent directories of a destination.
    pub dir_mode: u32,

    /// Disallow copying symlinked source files, for security or portability.
    pub disable_symlinks: bool,

    /// Options for the shared HTTP(S) client.
    pub http: HttpOptions,

    /// Directory for intermediate downloads. Defaults to the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Abort a fetch that takes longer than this many seconds.
    pub timeout: Option<u64>,

    /// Bits removed from every mode applied to created files and directories.
    pub umask: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            dir_mode: 0o755,
            disable_symlinks: false,
            http: HttpOptions::default(),
            temp_dir: None,
            timeout: None,
            umask: 0,
        }
    }
}

/// The client-side state a backend is bound to: options, the lazily
/// created HTTP client, and an optional progress listener.
#[derive(Clone, Default)]
pub struct ClientOwner {
    http_client: OnceCell<reqwest::Client>,
    on_progress: Option<OnProgressFn>,
    options: ClientOptions,
}

impl ClientOwner {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            http_client: OnceCell::new(),
            on_progress: None,
            options,
        }
    }

    pub fn with_progress(mut self, on_progress: OnProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Return the HTTP client, or create it if it does not exist.
    pub fn get_http_client(&self) -> Result<&reqwest::Client, HttpClientError> {
        self.http_client
            .get_or_try_init(|| create_http_client_with_options(&self.options.http))
    }

    /// Apply the configured umask to the provided mode.
    pub fn mode(&self, mode: u32) -> u32 {
        mode & !self.options.umask
    }

    pub fn dir_mode(&self) -> u32 {
        self.mode(self.options.dir_mode)
    }

    pub fn umask(&self) -> u32 {
        self.options.umask
    }

    pub fn disable_symlinks(&self) -> bool {
        self.options.disable_symlinks
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.options
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout.map(Duration::from_secs)
    }

    pub fn report_progress(&self, current: u64, total: Option<u64>) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(current, total);
        }
    }
}

impl fmt::Debug for ClientOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOwner")
            .field("options", &self.options)
            .field("has_http_client", &self.http_client.get().is_some())
            .field("has_progress", &self.on_progress.is_some())
            .finish()
    }
}
