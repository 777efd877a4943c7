//! Durable per-product price state.
//!
//! Every mutation is flushed to a single JSON file with an atomic replace.
//! The file's size and mtime are remembered after each load or write; if
//! they no longer match (file deleted, or rewritten by another process) the
//! document is reloaded before the next access. Deleting the file is a valid
//! manual reset, even while the monitor runs.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::ProductState;
use crate::persist::{backup_corrupt, write_json_atomic};

pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

fn default_version() -> u32 {
    STORE_VERSION
}

/// On-disk representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub products: BTreeMap<String, ProductState>,
    /// Failure counts for products that have no state yet
    #[serde(default)]
    pub pending_failures: BTreeMap<String, u32>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            products: BTreeMap::new(),
            pending_failures: BTreeMap::new(),
        }
    }
}

/// What the file looked like after our last load or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    fs::metadata(path).ok().map(|meta| FileStamp {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}

struct Inner {
    doc: StoreDocument,
    stamp: Option<FileStamp>,
}

/// Price state keyed by external id.
pub struct PriceStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl PriceStore {
    /// Open the store, starting empty when the file is missing.
    ///
    /// An unparseable file is moved aside to `<file>.corrupt-<ts>` and the
    /// store starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let doc = Self::load(&path)?;
        info!(
            "[STORE] Loaded {} products from {}",
            doc.products.len(),
            path.display()
        );
        let stamp = file_stamp(&path);
        Ok(Self {
            path,
            inner: Mutex::new(Inner { doc, stamp }),
        })
    }

    fn load(path: &Path) -> Result<StoreDocument, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        match serde_json::from_str::<StoreDocument>(&raw) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                match backup_corrupt(path) {
                    Ok(backup) => warn!(
                        "[STORE] {} is corrupt ({}), moved to {} and starting empty",
                        path.display(),
                        e,
                        backup.display()
                    ),
                    Err(rename_err) => warn!(
                        "[STORE] {} is corrupt ({}) and could not be moved aside: {}",
                        path.display(),
                        e,
                        rename_err
                    ),
                }
                Ok(StoreDocument::default())
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the document, reloading it first if the file changed under us.
    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;

        let current = file_stamp(&self.path);
        if current != inner.stamp {
            inner.doc = Self::load(&self.path)?;
            inner.stamp = file_stamp(&self.path);
            info!(
                "[STORE] {} changed on disk, reloaded {} products",
                self.path.display(),
                inner.doc.products.len()
            );
        }
        Ok(inner)
    }

    fn flush(
        &self,
        doc: &StoreDocument,
        stamp: &mut Option<FileStamp>,
    ) -> Result<(), StoreError> {
        write_json_atomic(&self.path, doc).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        *stamp = file_stamp(&self.path);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ProductState>, StoreError> {
        Ok(self.lock()?.doc.products.get(id).cloned())
    }

    /// Read-modify-write one product under the store lock.
    ///
    /// The mutator sees the current state and returns the replacement
    /// (`None` leaves the entry untouched, nothing is written) plus a value
    /// handed back to the caller. If the flush fails the previous entry is
    /// restored.
    pub fn put<R, F>(&self, id: &str, mutator: F) -> Result<R, StoreError>
    where
        F: FnOnce(Option<&ProductState>) -> (Option<ProductState>, R),
    {
        let mut guard = self.lock()?;
        let Inner { doc, stamp } = &mut *guard;
        let (next, result) = mutator(doc.products.get(id));

        let Some(next) = next else {
            return Ok(result);
        };

        let previous = doc.products.insert(id.to_string(), next);
        if let Err(e) = self.flush(doc, stamp) {
            match previous {
                Some(prev) => doc.products.insert(id.to_string(), prev),
                None => doc.products.remove(id),
            };
            return Err(e);
        }

        debug!("[STORE] Updated {}", id);
        Ok(result)
    }

    /// Drop a product's state and any pending failure count.
    pub fn remove(&self, id: &str) -> Result<Option<ProductState>, StoreError> {
        let mut guard = self.lock()?;
        let Inner { doc, stamp } = &mut *guard;
        let removed = doc.products.remove(id);
        let pending = doc.pending_failures.remove(id);

        if removed.is_none() && pending.is_none() {
            return Ok(None);
        }

        if let Err(e) = self.flush(doc, stamp) {
            if let Some(state) = removed {
                doc.products.insert(id.to_string(), state);
            }
            if let Some(count) = pending {
                doc.pending_failures.insert(id.to_string(), count);
            }
            return Err(e);
        }

        info!("[STORE] Removed {}", id);
        Ok(removed)
    }

    /// Drop every product. Returns how many states were removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let mut guard = self.lock()?;
        let Inner { doc, stamp } = &mut *guard;
        let previous = std::mem::take(doc);
        let count = previous.products.len();

        if let Err(e) = self.flush(doc, stamp) {
            *doc = previous;
            return Err(e);
        }

        info!("[STORE] Cleared {} products", count);
        Ok(count)
    }

    /// Increment the consecutive failure count and return the new value.
    ///
    /// Products without state are counted in the pending map.
    pub fn record_failure(&self, id: &str) -> Result<u32, StoreError> {
        let mut guard = self.lock()?;
        let Inner { doc, stamp } = &mut *guard;

        let (count, previous) = match doc.products.get_mut(id) {
            Some(state) => {
                let previous = state.consecutive_failure_count;
                state.consecutive_failure_count = previous + 1;
                (previous + 1, previous)
            }
            None => {
                let entry = doc.pending_failures.entry(id.to_string()).or_insert(0);
                let previous = *entry;
                *entry += 1;
                (previous + 1, previous)
            }
        };

        if let Err(e) = self.flush(doc, stamp) {
            match doc.products.get_mut(id) {
                Some(state) => state.consecutive_failure_count = previous,
                None if previous == 0 => {
                    doc.pending_failures.remove(id);
                }
                None => {
                    doc.pending_failures.insert(id.to_string(), previous);
                }
            }
            return Err(e);
        }

        Ok(count)
    }

    /// Reset the failure count after a successful fetch.
    ///
    /// Writes nothing when there is nothing to reset.
    pub fn clear_failures(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let Inner { doc, stamp } = &mut *guard;

        let state_count = doc
            .products
            .get(id)
            .map(|s| s.consecutive_failure_count)
            .unwrap_or(0);
        let pending = doc.pending_failures.remove(id);

        if state_count == 0 && pending.is_none() {
            return Ok(());
        }
        if let Some(state) = doc.products.get_mut(id) {
            state.consecutive_failure_count = 0;
        }

        if let Err(e) = self.flush(doc, stamp) {
            if let Some(state) = doc.products.get_mut(id) {
                state.consecutive_failure_count = state_count;
            }
            if let Some(count) = pending {
                doc.pending_failures.insert(id.to_string(), count);
            }
            return Err(e);
        }

        Ok(())
    }

    pub fn failure_count(&self, id: &str) -> Result<u32, StoreError> {
        let guard = self.lock()?;
        let doc = &guard.doc;
        Ok(doc
            .products
            .get(id)
            .map(|s| s.consecutive_failure_count)
            .or_else(|| doc.pending_failures.get(id).copied())
            .unwrap_or(0))
    }

    /// Copy of the whole document.
    pub fn snapshot(&self) -> Result<StoreDocument, StoreError> {
        Ok(self.lock()?.doc.clone())
    }
}
