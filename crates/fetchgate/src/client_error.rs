use crate::backend_error::BackendError;
use crate::detect::DetectError;
use starbase_styles::{Style, Stylize};
use thiserror::Error;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum ClientError {
    #[diagnostic(transparent)]
    #[error(transparent)]
    Backend(#[from] Box<BackendError>),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Detect(#[from] Box<DetectError>),

    #[diagnostic(
        code(fetchgate::client::backend_not_found),
        help = "Register a backend for this scheme, or force another one with the scheme::url syntax."
    )]
    #[error(
        "No backend registered for scheme {} (source {}).",
        .scheme.style(Style::Id),
        .source_string.style(Style::Url),
    )]
    BackendNotFound {
        scheme: String,
        source_string: String,
    },

    #[diagnostic(code(fetchgate::client::invalid_url))]
    #[error("Failed to parse source {} as a URL.", .url.style(Style::Url))]
    InvalidUrl {
        url: String,
        #[source]
        error: Box<url::ParseError>,
    },

    #[diagnostic(code(fetchgate::client::missing_file_name))]
    #[error(
        "Source {} resolved to a single file, but no file name could be derived from it.",
        .url.style(Style::Url),
    )]
    MissingFileName { url: String },

    #[diagnostic(code(fetchgate::client::unresolved_mode))]
    #[error(
        "The {} backend could not decide whether {} is a file or a directory.",
        .scheme.style(Style::Id),
        .url.style(Style::Url),
    )]
    UnresolvedMode { scheme: String, url: String },
}

impl ClientError {
    /// The backend's own error, when the failure happened inside one.
    pub fn as_backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(error) => Some(error),
            _ => None,
        }
    }
}

impl From<BackendError> for ClientError {
    fn from(e: BackendError) -> ClientError {
        ClientError::Backend(Box::new(e))
    }
}

impl From<DetectError> for ClientError {
    fn from(e: DetectError) -> ClientError {
        ClientError::Detect(Box::new(e))
    }
}
