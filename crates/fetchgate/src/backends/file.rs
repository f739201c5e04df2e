use crate::backend::{Backend, OwnerBinding};
use crate::backend_error::BackendError;
use crate::context::FetchContext;
use crate::copy::copy_file;
use crate::mode::FetchMode;
use crate::owner::ClientOwner;
use async_trait::async_trait;
use starbase_styles::color;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// Fetches from the local file system. Directories and files are linked
/// into place by default, while the copy policy copies file contents.
#[derive(Debug, Default)]
pub struct FileBackend {
    binding: OwnerBinding,

    /// Copy file contents instead of creating a symlink.
    copy: bool,
}

impl FileBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that copies single files instead of linking them.
    pub fn copying() -> Self {
        Self {
            binding: OwnerBinding::default(),
            copy: true,
        }
    }

    pub fn is_copying(&self) -> bool {
        self.copy
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn resolve_mode(&self, ctx: &FetchContext, url: &Url) -> Result<FetchMode, BackendError> {
        self.binding.owner(self.name())?;
        ctx.check()?;

        let path = url_to_path(url)?;
        let metadata = std::fs::metadata(&path).map_err(|error| BackendError::SourceMissing {
            path: path.clone(),
            error: Box::new(error),
        })?;

        Ok(if metadata.is_dir() {
            FetchMode::Directory
        } else {
            FetchMode::File
        })
    }

    async fn get(&self, ctx: &FetchContext, dest: &Path, url: &Url) -> Result<(), BackendError> {
        let owner = self.binding.owner(self.name())?;
        let path = url_to_path(url)?;

        // The source must exist and be a directory
        let metadata = std::fs::metadata(&path).map_err(|error| BackendError::SourceMissing {
            path: path.clone(),
            error: Box::new(error),
        })?;

        if !metadata.is_dir() {
            return Err(BackendError::SourceNotDirectory { path });
        }

        // If the destination exists, it must be a symlink from a previous fetch
        if let Some(existing) = lstat(dest)? {
            if !existing.file_type().is_symlink() {
                return Err(BackendError::DestinationConflict {
                    backend: self.name().to_owned(),
                    path: dest.to_path_buf(),
                });
            }

            trace!(dest = ?dest, "Destination is a symlink from a previous fetch, replacing");
        }

        create_parent_dirs(&owner, dest)?;
        ctx.check()?;

        debug!(
            from = ?path,
            to = ?dest,
            "Linking directory {} to {}",
            color::path(&path),
            color::path(dest),
        );

        replace_with_symlink(&path, dest)
    }

    async fn get_file(&self, ctx: &FetchContext, dest: &Path, url: &Url) -> Result<(), BackendError> {
        let owner = self.binding.owner(self.name())?;
        let path = url_to_path(url)?;

        // The source must exist and be a file
        let metadata = std::fs::metadata(&path).map_err(|error| BackendError::SourceMissing {
            path: path.clone(),
            error: Box::new(error),
        })?;

        if metadata.is_dir() {
            return Err(BackendError::SourceNotFile { path });
        }

        if let Some(existing) = lstat(dest)? {
            let result = if existing.is_dir() {
                std::fs::remove_dir(dest)
            } else {
                std::fs::remove_file(dest)
            };

            result.map_err(|error| BackendError::FailedRemove {
                path: dest.to_path_buf(),
                error: Box::new(error),
            })?;
        }

        create_parent_dirs(&owner, dest)?;
        ctx.check()?;

        if !self.copy {
            debug!(
                from = ?path,
                to = ?dest,
                "Linking file {} to {}",
                color::path(&path),
                color::path(dest),
            );

            return symlink(&path, dest);
        }

        debug!(
            from = ?path,
            to = ?dest,
            "Copying file {} to {}",
            color::path(&path),
            color::path(dest),
        );

        copy_file(ctx, &owner, dest, &path, metadata.permissions().mode() & 0o7777).await?;

        Ok(())
    }

    fn bind_owner(&self, owner: Arc<ClientOwner>) {
        self.binding.bind(owner);
    }
}

/// Extract the local path from a `file://` URL, without requiring it to be absolute
/// when the URL carries no host.
pub(crate) fn url_to_path(url: &Url) -> Result<PathBuf, BackendError> {
    url.to_file_path().map_err(|_| BackendError::InvalidUrl {
        backend: "file".into(),
        url: url.to_string(),
        reason: "not a local file path".into(),
    })
}

/// Like `symlink_metadata`, but a missing path is `None` instead of an error.
pub(crate) fn lstat(path: &Path) -> Result<Option<std::fs::Metadata>, BackendError> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(BackendError::FailedStat {
            path: path.to_path_buf(),
            error: Box::new(error),
        }),
    }
}

pub(crate) fn create_parent_dirs(owner: &ClientOwner, dest: &Path) -> Result<(), BackendError> {
    let Some(parent) = dest.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(());
    };

    DirBuilder::new()
        .recursive(true)
        .mode(owner.dir_mode())
        .create(parent)
        .map_err(|error| BackendError::FailedCreateDir {
            path: parent.to_path_buf(),
            error: Box::new(error),
        })
}

fn symlink(from: &Path, to: &Path) -> Result<(), BackendError> {
    std::os::unix::fs::symlink(from, to).map_err(|error| BackendError::FailedLink {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: Box::new(error),
    })
}

// The new link is created beside the destination and renamed over it,
// so an existing link is swapped without the destination ever being absent.
fn replace_with_symlink(from: &Path, to: &Path) -> Result<(), BackendError> {
    let staging = staging_path(to);

    if lstat(&staging)?.is_some() {
        std::fs::remove_file(&staging).map_err(|error| BackendError::FailedRemove {
            path: staging.clone(),
            error: Box::new(error),
        })?;
    }

    symlink(from, &staging)?;

    std::fs::rename(&staging, to).map_err(|error| {
        let _ = std::fs::remove_file(&staging);

        BackendError::FailedLink {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            error: Box::new(error),
        }
    })
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    dest.with_file_name(format!(".{name}.fetchgate-{}", std::process::id()))
}
