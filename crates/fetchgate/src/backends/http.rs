use super::file::{create_parent_dirs, lstat};
use crate::backend::{Backend, OwnerBinding};
use crate::backend_error::BackendError;
use crate::context::FetchContext;
use crate::copy::part_path;
use crate::http::HttpClientError;
use crate::mode::FetchMode;
use crate::owner::ClientOwner;
use async_trait::async_trait;
use starbase_styles::color;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use url::Url;

/// Downloads single files over HTTP(S) with the owner's shared client.
#[derive(Debug, Default)]
pub struct HttpBackend {
    binding: OwnerBinding,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn download(
        &self,
        ctx: &FetchContext,
        owner: &ClientOwner,
        part_file: &Path,
        url: &Url,
    ) -> Result<(), BackendError> {
        let map_http_error = |error: reqwest::Error| {
            BackendError::from(HttpClientError::Http {
                url: url.to_string(),
                error: Box::new(error),
            })
        };
        let map_write_error = |error: std::io::Error| BackendError::FailedWrite {
            path: part_file.to_path_buf(),
            error: Box::new(error),
        };

        let client = owner.get_http_client()?;
        let mut response = ctx
            .run(async { client.get(url.as_str()).send().await.map_err(map_http_error) })
            .await?;
        let status = response.status();

        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(part_file)
            .await
            .map_err(map_write_error)?;
        let mut downloaded = 0u64;

        while let Some(chunk) = ctx
            .run(async { response.chunk().await.map_err(map_http_error) })
            .await?
        {
            ctx.run(async { file.write_all(&chunk).await.map_err(map_write_error) })
                .await?;

            downloaded += chunk.len() as u64;
            owner.report_progress(downloaded, total);
        }

        file.flush().await.map_err(map_write_error)?;

        trace!(url = url.as_str(), bytes = downloaded, "Downloaded response body");

        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn resolve_mode(&self, _ctx: &FetchContext, url: &Url) -> Result<FetchMode, BackendError> {
        self.binding.owner(self.name())?;

        Ok(if url.path().ends_with('/') {
            FetchMode::Directory
        } else {
            FetchMode::File
        })
    }

    async fn get(&self, _ctx: &FetchContext, _dest: &Path, url: &Url) -> Result<(), BackendError> {
        self.binding.owner(self.name())?;

        Err(BackendError::UnsupportedMode {
            backend: self.name().to_owned(),
            mode: FetchMode::Directory,
            url: url.to_string(),
        })
    }

    async fn get_file(&self, ctx: &FetchContext, dest: &Path, url: &Url) -> Result<(), BackendError> {
        let owner = self.binding.owner(self.name())?;

        if lstat(dest)?.is_some_and(|meta| meta.is_dir()) {
            return Err(BackendError::DestinationConflict {
                backend: self.name().to_owned(),
                path: dest.to_path_buf(),
            });
        }

        create_parent_dirs(&owner, dest)?;

        debug!(
            url = url.as_str(),
            dest = ?dest,
            "Downloading {} to {}",
            color::url(url.as_str()),
            color::path(dest),
        );

        // Download beside the destination, and only move it into place once
        // the entire body has arrived
        let part_file = part_path(dest);

        if let Err(error) = self.download(ctx, &owner, &part_file, url).await {
            let _ = std::fs::remove_file(&part_file);

            return Err(error);
        }

        std::fs::rename(&part_file, dest).map_err(|error| BackendError::FailedWrite {
            path: dest.to_path_buf(),
            error: Box::new(error),
        })
    }

    fn bind_owner(&self, owner: Arc<ClientOwner>) {
        self.binding.bind(owner);
    }
}
