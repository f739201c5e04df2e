use crate::client::{Client, FetchRequest};
use crate::context::FetchContext;
use crate::storage_error::StorageError;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use starbase_styles::color;
use starbase_utils::{fs, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, trace};

/// Result of a storage lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageDir {
    /// Local path the key maps to. Stable for the lifetime of the storage.
    pub path: PathBuf,

    /// Whether a fetch for the key has completed.
    pub present: bool,
}

/// Maps logical keys to locally fetched directories, so repeated fetches
/// of the same source can be served from disk.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up the key without fetching. An entry that was never fetched is
    /// not an error, only a fault within the storage itself is.
    fn dir(&self, key: &str) -> Result<StorageDir, StorageError>;

    /// Fetch the source into the key's path if not present. When present,
    /// this is a no-op unless `update` is requested, which fetches again.
    async fn get(
        &self,
        ctx: &FetchContext,
        key: &str,
        source: &str,
        update: bool,
    ) -> Result<(), StorageError>;
}

/// Metadata written beside each entry after a successful fetch.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageEntry {
    pub key: String,
    pub source: String,
    pub fetched_at: u64,
}

type KeyLocks = Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Storage backed by a folder on the local file system. Every key is
/// stored in a directory named after the hash of the key.
pub struct FolderStorage {
    client: Arc<Client>,
    locks: KeyLocks,
    root: PathBuf,
}

/// Handle on a key's lock. Dropping the last handle for a key removes the
/// lock from the map, so only keys with calls in flight are tracked.
struct KeyLock<'storage> {
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    locks: &'storage KeyLocks,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // One reference is held by the map, the other is ours
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

impl FolderStorage {
    pub fn new(root: impl AsRef<Path>, client: Arc<Client>) -> Self {
        Self {
            client,
            locks: Mutex::new(FxHashMap::default()),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an entry for the key lives at, whether present or not.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(hash_key(key))
    }

    /// Path of the metadata file describing the key's entry.
    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hash_key(key)))
    }

    /// Read the metadata of a fetched entry, if it was recorded.
    pub fn load_entry(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        let path = self.metadata_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let entry: StorageEntry =
            json::read_file(&path).map_err(|error| StorageError::CorruptedEntry {
                key: key.to_owned(),
                path: path.clone(),
                reason: error.to_string(),
            })?;

        if entry.key != key {
            return Err(StorageError::CorruptedEntry {
                key: key.to_owned(),
                path,
                reason: format!("metadata belongs to key {}", entry.key),
            });
        }

        Ok(Some(entry))
    }

    fn key_lock(&self, key: &str) -> KeyLock<'_> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        KeyLock {
            key: key.to_owned(),
            lock: Arc::clone(locks.entry(key.to_owned()).or_default()),
            locks: &self.locks,
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl Storage for FolderStorage {
    fn dir(&self, key: &str) -> Result<StorageDir, StorageError> {
        let path = self.entry_path(key);
        let present = std::fs::symlink_metadata(&path).is_ok();

        // Validate the metadata, but its absence never hides a present entry
        if present {
            self.load_entry(key)?;
        }

        Ok(StorageDir { path, present })
    }

    #[instrument(skip(self, ctx))]
    async fn get(
        &self,
        ctx: &FetchContext,
        key: &str,
        source: &str,
        update: bool,
    ) -> Result<(), StorageError> {
        let key_lock = self.key_lock(key);
        let _guard = ctx
            .run(async { Ok::<_, StorageError>(key_lock.lock.lock().await) })
            .await?;

        // Check again once we hold the lock, another call may have fetched it
        let dir = self.dir(key)?;

        if dir.present && !update {
            trace!(key, path = ?dir.path, "Entry already present, skipping fetch");

            return Ok(());
        }

        debug!(
            key,
            source,
            update,
            "{} {} into {}",
            if dir.present { "Updating" } else { "Fetching" },
            color::url(source),
            color::path(&dir.path),
        );

        fs::create_dir_all(&self.root)?;

        self.client
            .fetch(ctx, &FetchRequest::dir(source, &dir.path))
            .await?;

        let fetched_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or_default();

        json::write_file(
            self.metadata_path(key),
            &StorageEntry {
                key: key.to_owned(),
                source: source.to_owned(),
                fetched_at,
            },
            true,
        )?;

        Ok(())
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());

    format!("{:x}", hasher.finalize())
}
