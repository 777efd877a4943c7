//! Product catalog file: a JSON array of marketplace entries.
//!
//! ```json
//! [
//!   { "seq": 1, "platform": "amazon", "asin": "B0C1XYZ9QA", "title": "Kindle" },
//!   { "seq": 2, "platform": "ml", "mlId": "MLB-3456789012" },
//!   { "seq": 3, "platform": "shopee", "shopId": 123456, "itemId": 7890, "status": "disabled" }
//! ]
//! ```
//!
//! Fields this module does not know about are kept on rewrite.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::models::ProductRef;
use crate::persist::write_json_atomic;
use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Catalog {path} is not a JSON array of entries: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Entry {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

/// One catalog entry as written by the operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<Value>,
    #[serde(rename = "mlId", default, skip_serializing_if = "Option::is_none")]
    pub ml_id: Option<Value>,
    #[serde(rename = "shopId", default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<Value>,
    #[serde(rename = "itemId", default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identifier fields may be JSON strings or numbers.
fn as_text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

impl CatalogEntry {
    /// Entries with `status: "disabled"` are skipped by the monitor.
    pub fn is_active(&self) -> bool {
        !matches!(&self.status, Some(s) if s.trim().eq_ignore_ascii_case("disabled"))
    }

    fn raw_identifier(&self, platform: Platform) -> Option<String> {
        let generic = as_text(&self.id);
        match platform {
            Platform::Amazon => as_text(&self.asin).or(generic),
            Platform::MercadoLivre => as_text(&self.ml_id).or(generic),
            Platform::Shopee => match (as_text(&self.shop_id), as_text(&self.item_id)) {
                (Some(shop), Some(item)) => Some(format!("{}.{}", shop, item)),
                (None, Some(item)) if item.contains(['.', '/']) => Some(item),
                _ => generic,
            },
        }
    }

    /// Validate into a [`ProductRef`]; `index` is only used for the error.
    pub fn to_product_ref(&self, index: usize) -> Result<ProductRef, CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidEntry { index, reason };

        let raw_platform = self
            .platform
            .as_deref()
            .ok_or_else(|| invalid("missing platform".to_string()))?;
        let platform = Platform::from_str(raw_platform)
            .ok_or_else(|| invalid(format!("unknown platform {:?}", raw_platform)))?;

        let raw_id = self
            .raw_identifier(platform)
            .ok_or_else(|| invalid(format!("missing {} identifier", platform)))?;
        let external_id = platform
            .normalize_id(&raw_id)
            .ok_or_else(|| invalid(format!("malformed {} identifier {:?}", platform, raw_id)))?;

        let mut product = ProductRef::new(platform, external_id);
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            product = product.with_title(title);
        }
        Ok(product)
    }
}

/// Catalog loaded from disk.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
            path: path.clone(),
            source,
        })?;
        let entries = serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validation result for every active entry, in file order.
    pub fn active_products(&self) -> Vec<Result<ProductRef, CatalogError>> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_active())
            .map(|(i, e)| e.to_product_ref(i))
            .collect()
    }

    /// Errors for every entry, active or not.
    pub fn validate(&self) -> Vec<CatalogError> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.to_product_ref(i).err())
            .collect()
    }

    /// Remove entries that resolve to `product`. Returns how many were removed.
    pub fn remove(&mut self, product: &ProductRef) -> usize {
        let before = self.entries.len();
        let mut index = 0;
        self.entries.retain(|entry| {
            let keep = match entry.to_product_ref(index) {
                Ok(p) => p.platform != product.platform || p.external_id != product.external_id,
                Err(_) => true,
            };
            index += 1;
            keep
        });
        before - self.entries.len()
    }

    /// Give every entry without a `seq` its 1-based position.
    ///
    /// Entries that already carry a `seq` keep it.
    pub fn number(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.seq.get_or_insert(i as u64 + 1);
        }
    }

    pub fn save(&self) -> Result<(), CatalogError> {
        write_json_atomic(&self.path, &self.entries).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Reload the file, drop `product` and write it back.
    ///
    /// Reloading keeps edits made to the file since the cycle started.
    pub fn remove_from_file(path: impl AsRef<Path>, product: &ProductRef) -> Result<usize, CatalogError> {
        let mut catalog = Self::load(path)?;
        let removed = catalog.remove(product);
        if removed > 0 {
            catalog.save()?;
            info!(
                "[CATALOG] Removed {} from {}",
                product.label(),
                catalog.path.display()
            );
        }
        Ok(removed)
    }
}
