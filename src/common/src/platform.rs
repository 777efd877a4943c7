//! Marketplace abstraction.
//!
//! Provides the platform enum shared by the catalog, the source adapters
//! and the price store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported e-commerce marketplaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    #[serde(alias = "ml", alias = "mercado_livre", alias = "mercadolibre")]
    MercadoLivre,
    Shopee,
}

impl Platform {
    /// Every platform, in the order sources are registered.
    pub const ALL: [Platform; 3] = [Platform::Amazon, Platform::MercadoLivre, Platform::Shopee];

    /// Get the platform name as stored in the catalog and state files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::MercadoLivre => "mercadolivre",
            Platform::Shopee => "shopee",
        }
    }

    /// Parse platform from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "amazon" => Some(Platform::Amazon),
            "mercadolivre" | "mercado_livre" | "mercadolibre" | "ml" => {
                Some(Platform::MercadoLivre)
            }
            "shopee" => Some(Platform::Shopee),
            _ => None,
        }
    }

    /// Human-readable store name used in notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Amazon => "Amazon",
            Platform::MercadoLivre => "Mercado Livre",
            Platform::Shopee => "Shopee",
        }
    }

    /// Validate and normalize a marketplace identifier.
    ///
    /// - Amazon: 10-character alphanumeric ASIN, upper-cased
    /// - Mercado Livre: site prefix + digits (`MLB-123` becomes `MLB123`)
    /// - Shopee: `{shop_id}.{item_id}` (a `/` separator is accepted)
    pub fn normalize_id(&self, raw: &str) -> Option<String> {
        let id = raw.trim();
        match self {
            Platform::Amazon => {
                let asin = id.to_uppercase();
                (asin.len() == 10 && asin.chars().all(|c| c.is_ascii_alphanumeric()))
                    .then_some(asin)
            }
            Platform::MercadoLivre => {
                let compact: String = id.to_uppercase().chars().filter(|c| *c != '-').collect();
                if compact.len() <= 3 || !compact.is_ascii() {
                    return None;
                }
                let (prefix, digits) = compact.split_at(3);
                let valid = prefix.chars().all(|c| c.is_ascii_uppercase())
                    && prefix.starts_with("ML")
                    && digits.chars().all(|c| c.is_ascii_digit());
                valid.then_some(compact)
            }
            Platform::Shopee => {
                let (shop, item) = id.split_once(['.', '/'])?;
                let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
                (numeric(shop) && numeric(item)).then(|| format!("{}.{}", shop, item))
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
