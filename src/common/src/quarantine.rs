//! Record of products removed from the catalog after repeated NOT_FOUND.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::ProductRef;
use crate::persist::write_json_atomic;
use crate::platform::Platform;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineRecord {
    pub platform: Platform,
    pub external_id: String,
    pub title: Option<String>,
    pub reason: String,
    pub failures: u32,
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn not_found(product: &ProductRef, title: Option<String>, failures: u32) -> Self {
        Self {
            platform: product.platform,
            external_id: product.external_id.clone(),
            title: title.or_else(|| product.title_hint.clone()),
            reason: "not_found".to_string(),
            failures,
            quarantined_at: Utc::now(),
        }
    }
}

/// Append-only JSON array of quarantine records.
pub struct QuarantineLog {
    path: PathBuf,
}

impl QuarantineLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Vec<QuarantineRecord>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn append(&self, record: QuarantineRecord) -> Result<(), StoreError> {
        let mut records = self.load()?;
        info!(
            "[QUARANTINE] {}:{} after {} failures ({})",
            record.platform, record.external_id, record.failures, record.reason
        );
        records.push(record);
        write_json_atomic(&self.path, &records).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
