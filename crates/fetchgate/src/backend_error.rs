use crate::context::ContextError;
use crate::http::HttpClientError;
use crate::mode::FetchMode;
use crate::process::ProcessError;
use starbase_styles::{Style, Stylize};
use starbase_utils::fs::FsError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum BackendError {
    #[diagnostic(transparent)]
    #[error(transparent)]
    Context(#[from] ContextError),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Fs(#[from] Box<FsError>),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Http(#[from] Box<HttpClientError>),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Process(#[from] Box<ProcessError>),

    #[diagnostic(
        code(fetchgate::backend::destination_conflict),
        help = "Only destinations created by a previous fetch are replaced. Move or remove it manually."
    )]
    #[error(
        "Destination {} already exists and is not managed by the {} backend.",
        .path.style(Style::Path),
        .backend.style(Style::Id),
    )]
    DestinationConflict { backend: String, path: PathBuf },

    #[diagnostic(code(fetchgate::backend::copy_failed))]
    #[error(
        "Failed to copy {} to {}.",
        .from.style(Style::Path),
        .to.style(Style::Path),
    )]
    FailedCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::create_dir_failed))]
    #[error("Failed to create directory {}.", .path.style(Style::Path))]
    FailedCreateDir {
        path: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::link_failed))]
    #[error(
        "Failed to link {} to {}.",
        .from.style(Style::Path),
        .to.style(Style::Path),
    )]
    FailedLink {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::remove_failed))]
    #[error("Failed to remove existing destination {}.", .path.style(Style::Path))]
    FailedRemove {
        path: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::stat_failed))]
    #[error("Failed to inspect {}.", .path.style(Style::Path))]
    FailedStat {
        path: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::write_failed))]
    #[error("Failed to write {}.", .path.style(Style::Path))]
    FailedWrite {
        path: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::http_status))]
    #[error(
        "Request for {} failed with status {status}.",
        .url.style(Style::Url),
    )]
    HttpStatus { url: String, status: u16 },

    #[diagnostic(code(fetchgate::backend::invalid_url))]
    #[error("Invalid {} source {}: {reason}", .backend, .url.style(Style::Url))]
    InvalidUrl {
        backend: String,
        url: String,
        reason: String,
    },

    #[diagnostic(code(fetchgate::backend::source_missing))]
    #[error("Source path {} does not exist or cannot be read.", .path.style(Style::Path))]
    SourceMissing {
        path: PathBuf,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::backend::source_not_dir))]
    #[error("Source path {} must be a directory.", .path.style(Style::Path))]
    SourceNotDirectory { path: PathBuf },

    #[diagnostic(code(fetchgate::backend::source_not_file))]
    #[error("Source path {} must be a file.", .path.style(Style::Path))]
    SourceNotFile { path: PathBuf },

    #[diagnostic(code(fetchgate::backend::symlinks_disabled))]
    #[error(
        "Copying of symlinks has been disabled, refusing to copy {}.",
        .path.style(Style::Path),
    )]
    SymlinksDisabled { path: PathBuf },

    #[diagnostic(
        code(fetchgate::backend::unbound),
        help = "Backends must be bound to a client with bind_owner() before use."
    )]
    #[error("The {} backend is not bound to a client.", .backend.style(Style::Id))]
    Unbound { backend: String },

    #[diagnostic(code(fetchgate::backend::unsupported_mode))]
    #[error(
        "The {} backend does not support {mode} fetches for {}.",
        .backend.style(Style::Id),
        .url.style(Style::Url),
    )]
    UnsupportedMode {
        backend: String,
        mode: FetchMode,
        url: String,
    },
}

impl BackendError {
    /// The source does not exist, or is the wrong kind for the operation.
    pub fn is_source_invalid(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing { .. } | Self::SourceNotDirectory { .. } | Self::SourceNotFile { .. }
        )
    }

    pub fn is_destination_conflict(&self) -> bool {
        matches!(self, Self::DestinationConflict { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Context(_) => true,
            Self::Process(error) => matches!(error.as_ref(), ProcessError::Context(_)),
            _ => false,
        }
    }
}

impl From<FsError> for BackendError {
    fn from(e: FsError) -> BackendError {
        BackendError::Fs(Box::new(e))
    }
}

impl From<HttpClientError> for BackendError {
    fn from(e: HttpClientError) -> BackendError {
        BackendError::Http(Box::new(e))
    }
}

impl From<ProcessError> for BackendError {
    fn from(e: ProcessError) -> BackendError {
        BackendError::Process(Box::new(e))
    }
}
