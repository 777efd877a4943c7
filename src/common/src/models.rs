//! Shared data models for products, observations and price history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductRef {
    pub platform: Platform,
    /// ASIN, Mercado Livre item id or Shopee `shop.item` pair
    pub external_id: String,
    /// Title from the catalog, used when the marketplace returns none
    pub title_hint: Option<String>,
}

impl ProductRef {
    pub fn new(platform: Platform, external_id: impl Into<String>) -> Self {
        Self {
            platform,
            external_id: external_id.into(),
            title_hint: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title_hint = Some(title.into());
        self
    }

    /// Label used in log lines.
    pub fn label(&self) -> String {
        format!("{}:{}", self.platform, self.external_id)
    }
}

/// How an observation was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    /// Authenticated partner/affiliate API
    PartnerApi,
    /// Unauthenticated public API
    PublicApi,
    /// HTML document fetch + pattern extraction
    HtmlScrape,
}

impl AcquisitionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMethod::PartnerApi => "partner_api",
            AcquisitionMethod::PublicApi => "public_api",
            AcquisitionMethod::HtmlScrape => "html_scrape",
        }
    }
}

/// Result of one successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub title: String,
    /// `None` means the page/API answered but carried no parseable price.
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub canonical_url: String,
    pub method: AcquisitionMethod,
}

impl Observation {
    pub fn has_price(&self) -> bool {
        self.price.is_some()
    }
}

/// One entry of the bounded price history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Persisted per-product tracking state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductState {
    pub last_price: Option<Decimal>,
    pub lowest_price: Option<Decimal>,
    #[serde(default)]
    pub history: VecDeque<PricePoint>,
    pub last_alert_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_failure_count: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProductState {
    /// Record a price: updates last/lowest and appends to the history ring.
    pub fn record_price(&mut self, price: Decimal, at: DateTime<Utc>, history_limit: usize) {
        self.last_price = Some(price);
        self.lowest_price = Some(match self.lowest_price {
            Some(lowest) => lowest.min(price),
            None => price,
        });
        self.history.push_back(PricePoint {
            price,
            timestamp: at,
        });
        while self.history.len() > history_limit.max(1) {
            self.history.pop_front();
        }
        self.updated_at = Some(at);
    }

    /// Average of the most recent `window` history prices.
    pub fn moving_average(&self, window: usize) -> Option<Decimal> {
        let window = window.max(1);
        let recent: Vec<Decimal> = self.history.iter().rev().take(window).map(|p| p.price).collect();
        if recent.is_empty() {
            return None;
        }
        let sum: Decimal = recent.iter().copied().sum();
        Some(sum / Decimal::from(recent.len()))
    }
}

/// A qualified price drop ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub platform: Platform,
    pub external_id: String,
    pub title: String,
    pub price: Decimal,
    pub reference_price: Decimal,
    pub drop_percent: Decimal,
    pub economy: Decimal,
    pub url: String,
    pub image_url: Option<String>,
}

impl Alert {
    /// Format the alert for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} | {} -> {} (-{:.1}%, R$ {:.2}) | {}",
            self.title, self.reference_price, self.price, self.drop_percent, self.economy, self.url
        )
    }
}
