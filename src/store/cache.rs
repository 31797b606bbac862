//! Write-once, name-addressed view of a storage folder.
//!
//! Built from a single folder listing per run, then consulted by every
//! download task. Each name maps to a cell that is initialized at most
//! once, so concurrent tasks for the same new file share one fetch and
//! one upload.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::{ObjectStore, StoreError};
use crate::types::FetchOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: String,
    pub outcome: FetchOutcome,
}

pub struct FileCache {
    store: Arc<dyn ObjectStore>,
    folder_id: String,
    entries: DashMap<String, Arc<OnceCell<String>>>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("folder_id", &self.folder_id)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl FileCache {
    /// List the folder once and index it by name. A failed listing yields
    /// an empty cache: every task then falls through to the network, and
    /// the worst case is a duplicate upload rather than a lost invoice.
    pub async fn load(store: Arc<dyn ObjectStore>, folder_id: &str) -> Self {
        let listing = match store.list_folder(folder_id).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!(folder = folder_id, "Could not list storage folder: {}", e);
                Vec::new()
            }
        };
        Self::from_listing(store, folder_id, listing)
    }

    pub fn from_listing(
        store: Arc<dyn ObjectStore>,
        folder_id: &str,
        listing: Vec<(String, String)>,
    ) -> Self {
        let entries = DashMap::with_capacity(listing.len());
        for (name, id) in listing {
            entries.insert(name, Arc::new(OnceCell::new_with(Some(id))));
        }
        Self {
            store,
            folder_id: folder_id.to_string(),
            entries,
        }
    }

    /// Number of names with a known id.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn exists(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .and_then(|entry| entry.value().get().cloned())
    }

    /// Upload `bytes` under `key` unless the name is already present.
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<Resolution, StoreError> {
        self.resolve(key, || async move { Ok::<_, StoreError>(bytes) })
            .await
    }

    /// Return the id stored under `key`, producing and uploading the bytes
    /// only on a miss. `produce` runs at most once per key across all
    /// concurrent callers; a failed attempt leaves the key unset so a later
    /// call can try again.
    pub async fn resolve<F, Fut, E>(&self, key: &str, produce: F) -> Result<Resolution, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: From<StoreError>,
    {
        let cell = self.cell(key);
        if let Some(id) = cell.get() {
            return Ok(Resolution {
                id: id.clone(),
                outcome: FetchOutcome::Exists,
            });
        }

        let uploaded = AtomicBool::new(false);
        let uploaded_ref = &uploaded;
        let id = cell
            .get_or_try_init(|| async move {
                let bytes = produce().await?;
                let id = self.store.upload(bytes, key, &self.folder_id).await?;
                uploaded_ref.store(true, Ordering::SeqCst);
                Ok::<_, E>(id)
            })
            .await?;

        let outcome = if uploaded.load(Ordering::SeqCst) {
            FetchOutcome::Downloaded
        } else {
            FetchOutcome::Exists
        };
        Ok(Resolution {
            id: id.clone(),
            outcome,
        })
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<String>> {
        let entry = self.entries.entry(key.to_string()).or_default();
        Arc::clone(entry.value())
    }
}
