use crate::client_error::ClientError;
use crate::context::ContextError;
use starbase_styles::{Style, Stylize};
use starbase_utils::fs::FsError;
use starbase_utils::json::JsonError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum StorageError {
    #[diagnostic(transparent)]
    #[error(transparent)]
    Client(#[from] Box<ClientError>),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Context(#[from] ContextError),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Fs(#[from] Box<FsError>),

    #[diagnostic(transparent)]
    #[error(transparent)]
    Json(#[from] Box<JsonError>),

    #[diagnostic(
        code(fetchgate::storage::corrupted_entry),
        help = "Remove the entry from the storage directory to fetch it again."
    )]
    #[error(
        "Storage entry for {} is corrupted: {reason}\nMetadata: {}",
        .key.style(Style::Id),
        .path.style(Style::Path),
    )]
    CorruptedEntry {
        key: String,
        path: PathBuf,
        reason: String,
    },
}

impl From<ClientError> for StorageError {
    fn from(e: ClientError) -> StorageError {
        StorageError::Client(Box::new(e))
    }
}

impl From<FsError> for StorageError {
    fn from(e: FsError) -> StorageError {
        StorageError::Fs(Box::new(e))
    }
}

impl From<JsonError> for StorageError {
    fn from(e: JsonError) -> StorageError {
        StorageError::Json(Box::new(e))
    }
}
