use crate::backend_error::BackendError;
use crate::context::FetchContext;
use crate::mode::FetchMode;
use crate::owner::ClientOwner;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, RwLock};
use url::Url;

/// The contract every scheme implementation must satisfy to be
/// registered with a client.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Decide whether the URL points to a directory or a single file,
    /// without performing the transfer itself. A cheap remote probe is allowed.
    async fn resolve_mode(&self, ctx: &FetchContext, url: &Url) -> Result<FetchMode, BackendError>;

    /// Fetch a directory tree into `dest`. The destination may already
    /// exist from a previous fetch, in which case it's updated in place.
    /// A destination in a form the backend does not manage must be left
    /// alone and reported as a conflict, never removed.
    async fn get(&self, ctx: &FetchContext, dest: &Path, url: &Url) -> Result<(), BackendError>;

    /// Fetch a single file into `dest`. If the backend can cheaply tell
    /// that the destination already matches, it may skip the transfer.
    async fn get_file(&self, ctx: &FetchContext, dest: &Path, url: &Url)
    -> Result<(), BackendError>;

    /// Associate the backend with the client that supplies shared
    /// configuration. Must happen before any other operation.
    fn bind_owner(&self, owner: Arc<ClientOwner>);
}

/// Holds the owner a backend has been bound to. Backends embed this
/// and call [`OwnerBinding::owner`] at the start of every operation.
#[derive(Debug, Default)]
pub struct OwnerBinding {
    owner: RwLock<Option<Arc<ClientOwner>>>,
}

impl OwnerBinding {
    pub fn bind(&self, owner: Arc<ClientOwner>) {
        let mut slot = self
            .owner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        *slot = Some(owner);
    }

    pub fn is_bound(&self) -> bool {
        self.owner
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or_default()
    }

    /// Return the bound owner. Using a backend before binding it is a
    /// programming error, surfaced as [`BackendError::Unbound`].
    pub fn owner(&self, backend: &str) -> Result<Arc<ClientOwner>, BackendError> {
        self.owner
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| BackendError::Unbound {
                backend: backend.to_owned(),
            })
    }
}
