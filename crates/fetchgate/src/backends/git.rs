use super::file::{create_parent_dirs, lstat};
use crate::backend::{Backend, OwnerBinding};
use crate::backend_error::BackendError;
use crate::context::FetchContext;
use crate::copy::copy_file;
use crate::mode::FetchMode;
use crate::owner::ClientOwner;
use crate::process::{ProcessError, run_captured};
use async_trait::async_trait;
use starbase_styles::color;
use starbase_utils::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tracing::{debug, trace, warn};
use url::Url;

/// Options consumed from the source URL's query string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GitSource {
    /// Remote URL with the `ref` and `depth` parameters removed.
    pub url: String,

    /// Branch, tag, or commit to check out.
    pub reference: Option<String>,

    /// Create a shallow clone with this many commits.
    pub depth: Option<u32>,
}

impl GitSource {
    pub fn from_url(url: &Url) -> Result<Self, BackendError> {
        let mut source = GitSource::default();
        let mut remote = url.clone();
        let mut kept = vec![];

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "ref" => source.reference = Some(value.into_owned()),
                "depth" => {
                    let depth = value.parse::<u32>().ok().filter(|depth| *depth > 0);

                    source.depth = Some(depth.ok_or_else(|| BackendError::InvalidUrl {
                        backend: "git".into(),
                        url: url.to_string(),
                        reason: format!("depth must be a positive number, received {value}"),
                    })?);
                }
                _ => kept.push((key.into_owned(), value.into_owned())),
            }
        }

        if kept.is_empty() {
            remote.set_query(None);
        } else {
            remote.query_pairs_mut().clear().extend_pairs(kept);
        }

        source.url = remote.to_string();

        Ok(source)
    }
}

/// Clones and updates Git repositories using the `git` binary.
#[derive(Debug)]
pub struct GitBackend {
    binding: OwnerBinding,
    program: PathBuf,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self {
            binding: OwnerBinding::default(),
            program: PathBuf::from("git"),
        }
    }
}

impl GitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a specific executable instead of the `git` found on `PATH`.
    pub fn with_program(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    fn new_git(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    async fn clone_repo(
        &self,
        ctx: &FetchContext,
        owner: &ClientOwner,
        source: &GitSource,
        dest: &Path,
    ) -> Result<(), BackendError> {
        create_parent_dirs(owner, dest)?;

        debug!(
            url = &source.url,
            dest = ?dest,
            "Cloning repository {} into {}",
            color::url(&source.url),
            color::path(dest),
        );

        let mut clone = self.new_git();
        clone.arg("clone");

        // Shallow clones can only follow a branch or tag
        if let Some(depth) = source.depth {
            clone.arg("--depth").arg(depth.to_string());

            if let Some(reference) = &source.reference {
                clone.arg("--branch").arg(reference);
            }
        }

        clone.arg("--").arg(&source.url).arg(dest);

        run_captured(ctx, &mut clone).await?;

        if source.depth.is_none()
            && let Some(reference) = &source.reference
        {
            run_captured(ctx, self.new_git().arg("checkout").arg(reference).current_dir(dest)).await?;
        }

        Ok(())
    }

    async fn update_repo(
        &self,
        ctx: &FetchContext,
        source: &GitSource,
        dest: &Path,
    ) -> Result<(), BackendError> {
        debug!(
            url = &source.url,
            dest = ?dest,
            "Updating repository in {}",
            color::path(dest),
        );

        let mut fetch = self.new_git();
        fetch.args(["fetch", "--tags"]);

        if let Some(depth) = source.depth {
            fetch.arg("--depth").arg(depth.to_string());
        }

        run_captured(ctx, fetch.arg("origin").current_dir(dest)).await?;

        if let Some(reference) = &source.reference {
            run_captured(ctx, self.new_git().arg("checkout").arg(reference).current_dir(dest)).await?;
        }

        // Tags and commits leave HEAD detached, and there's nothing to pull
        match run_captured(
            ctx,
            self.new_git()
                .args(["symbolic-ref", "-q", "HEAD"])
                .current_dir(dest),
        )
        .await
        {
            Ok(()) => {
                run_captured(ctx, self.new_git().args(["pull", "--ff-only"]).current_dir(dest))
                    .await?;
            }
            Err(ProcessError::FailedNonZeroExit { .. }) => {
                trace!(dest = ?dest, "HEAD is detached, skipping pull");
            }
            Err(error) => return Err(error.into()),
        }

        Ok(())
    }
}

#[async_trait]
impl Backend for GitBackend {
    fn name(&self) -> &str {
        "git"
    }

    async fn resolve_mode(&self, _ctx: &FetchContext, _url: &Url) -> Result<FetchMode, BackendError> {
        self.binding.owner(self.name())?;

        Ok(FetchMode::Directory)
    }

    async fn get(&self, ctx: &FetchContext, dest: &Path, url: &Url) -> Result<(), BackendError> {
        let owner = self.binding.owner(self.name())?;
        let source = GitSource::from_url(url)?;

        if lstat(dest)?.is_none() {
            return self.clone_repo(ctx, &owner, &source, dest).await;
        }

        // Only a work tree we can update is acceptable, anything else is left alone
        if !dest.join(".git").exists() {
            return Err(BackendError::DestinationConflict {
                backend: self.name().to_owned(),
                path: dest.to_path_buf(),
            });
        }

        self.update_repo(ctx, &source, dest).await
    }

    async fn get_file(&self, ctx: &FetchContext, dest: &Path, url: &Url) -> Result<(), BackendError> {
        let owner = self.binding.owner(self.name())?;

        // The last path segment is the file, everything before it the repository
        let mut repo_url = url.clone();
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(|name| name.to_owned())
            .ok_or_else(|| BackendError::InvalidUrl {
                backend: self.name().to_owned(),
                url: url.to_string(),
                reason: "missing file name in path".into(),
            })?;

        if let Ok(mut segments) = repo_url.path_segments_mut() {
            segments.pop();
        }

        let source = GitSource::from_url(&repo_url)?;
        let temp_dir = create_temp_path(&owner);

        trace!(temp_dir = ?temp_dir, file = &file_name, "Cloning into temporary directory to extract file");

        let result: Result<(), BackendError> = async {
            self.clone_repo(ctx, &owner, &source, &temp_dir).await?;

            let src = temp_dir.join(&file_name);
            let metadata = std::fs::metadata(&src).map_err(|error| BackendError::SourceMissing {
                path: src.clone(),
                error: Box::new(error),
            })?;

            if metadata.is_dir() {
                return Err(BackendError::SourceNotFile { path: src });
            }

            if lstat(dest)?.is_some() {
                std::fs::remove_file(dest).map_err(|error| BackendError::FailedRemove {
                    path: dest.to_path_buf(),
                    error: Box::new(error),
                })?;
            }

            create_parent_dirs(&owner, dest)?;
            copy_file(ctx, &owner, dest, &src, metadata.permissions().mode() & 0o7777).await?;

            Ok(())
        }
        .await;

        if let Err(error) = fs::remove_dir_all(&temp_dir) {
            warn!(temp_dir = ?temp_dir, "Failed to clean up temporary clone: {error}");
        }

        result
    }

    fn bind_owner(&self, owner: Arc<ClientOwner>) {
        self.binding.bind(owner);
    }
}

fn create_temp_path(owner: &ClientOwner) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or_default();

    owner
        .temp_dir()
        .join(format!("fetchgate-git-{}-{nanos}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ref_and_depth() {
        let url = Url::parse("https://example.com/repo.git?ref=v1.0.0&depth=1").unwrap();
        let source = GitSource::from_url(&url).unwrap();

        assert_eq!(source.url, "https://example.com/repo.git");
        assert_eq!(source.reference.as_deref(), Some("v1.0.0"));
        assert_eq!(source.depth, Some(1));
    }

    #[test]
    fn keeps_other_query_params() {
        let url = Url::parse("https://example.com/repo.git?ref=main&token=abc").unwrap();
        let source = GitSource::from_url(&url).unwrap();

        assert_eq!(source.url, "https://example.com/repo.git?token=abc");
    }

    #[test]
    fn errors_for_invalid_depth() {
        for depth in ["lots", "0", "-1"] {
            let url = Url::parse(&format!("https://example.com/repo.git?depth={depth}")).unwrap();

            assert!(GitSource::from_url(&url).is_err());
        }
    }
}
