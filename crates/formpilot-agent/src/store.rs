//! Shared catalog store: a single mutable slot holding the current catalog.
//!
//! Last writer wins. The on-disk catalog keeps exactly two top-level keys
//! (`clickable_elements`, `input_elements`); the staleness stamp lives in a
//! sidecar file next to it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogStamp};
use crate::{Error, Result};

/// A catalog as read back from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCatalog {
    pub catalog: Catalog,
    /// Missing for catalogs written by something other than this crate.
    pub stamp: Option<CatalogStamp>,
}

/// Persistence for the single current catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Replace the stored catalog and its stamp.
    async fn save(&self, catalog: &Catalog, stamp: &CatalogStamp) -> Result<()>;

    /// Read the stored catalog back; `None` when nothing has been written yet.
    async fn load(&self) -> Result<Option<StoredCatalog>>;
}

/// JSON file store. Writes go to a temp file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct FileCatalogStore {
    path: PathBuf,
}

impl FileCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar holding the [`CatalogStamp`], e.g. `clickable_items.stamp.json`.
    pub fn stamp_path(&self) -> PathBuf {
        self.path.with_extension("stamp.json")
    }

    async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[async_trait]
impl CatalogStore for FileCatalogStore {
    async fn save(&self, catalog: &Catalog, stamp: &CatalogStamp) -> Result<()> {
        // Catalog first: an interrupted save leaves the old stamp, which no longer
        // matches the page and so reads as stale.
        Self::write_atomic(&self.path, serde_json::to_vec_pretty(catalog)?).await?;
        Self::write_atomic(&self.stamp_path(), serde_json::to_vec_pretty(stamp)?).await?;
        debug!(
            "Saved catalog ({} elements, generation {}) to {}",
            catalog.len(),
            stamp.generation,
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredCatalog>> {
        let Some(bytes) = Self::read_optional(&self.path).await? else {
            return Ok(None);
        };
        let catalog: Catalog = serde_json::from_slice(&bytes)?;

        let stamp = match Self::read_optional(&self.stamp_path()).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(stamp) => Some(stamp),
                Err(e) => {
                    warn!("Ignoring unreadable catalog stamp: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Some(StoredCatalog { catalog, stamp }))
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    slot: Mutex<Option<StoredCatalog>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot directly, bypassing the stamp (as an external writer would).
    pub fn put(&self, stored: StoredCatalog) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(stored);
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn save(&self, catalog: &Catalog, stamp: &CatalogStamp) -> Result<()> {
        self.put(StoredCatalog {
            catalog: catalog.clone(),
            stamp: Some(stamp.clone()),
        });
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredCatalog>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| Error::Store("catalog slot poisoned".into()))?;
        Ok(slot.clone())
    }
}
