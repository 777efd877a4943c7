//! Acquisition layer: error taxonomy, strategy trait and fallback chain.
//!
//! Each marketplace builds a [`SourceAdapter`] from an ordered list of
//! strategies (partner API, public API, HTML scrape). The adapter tries them
//! in order and returns the first observation that carries a price.

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{AcquisitionMethod, Observation, ProductRef};
use crate::platform::Platform;
use crate::retry::{retry_transient, RetryPolicy};

/// Classification of a failed acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionErrorKind {
    AuthExpired,
    RateLimited,
    BlockedAntibot,
    NotFound,
    NoPrice,
    Network,
    Unknown,
}

impl AcquisitionErrorKind {
    /// Transient failures are retried within the same strategy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AcquisitionErrorKind::RateLimited | AcquisitionErrorKind::Network
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionErrorKind::AuthExpired => "AUTH_EXPIRED",
            AcquisitionErrorKind::RateLimited => "RATE_LIMITED",
            AcquisitionErrorKind::BlockedAntibot => "BLOCKED_ANTIBOT",
            AcquisitionErrorKind::NotFound => "NOT_FOUND",
            AcquisitionErrorKind::NoPrice => "NO_PRICE",
            AcquisitionErrorKind::Network => "NETWORK",
            AcquisitionErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for AcquisitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AcquisitionError {
    pub kind: AcquisitionErrorKind,
    pub message: String,
}

impl AcquisitionError {
    pub fn new(kind: AcquisitionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(AcquisitionErrorKind::AuthExpired, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(AcquisitionErrorKind::NotFound, message)
    }

    pub fn no_price(message: impl Into<String>) -> Self {
        Self::new(AcquisitionErrorKind::NoPrice, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(AcquisitionErrorKind::BlockedAntibot, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AcquisitionErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AcquisitionErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status.
    ///
    /// `authenticated` distinguishes a 403 on a bearer call (credential
    /// problem) from a 403 on an anonymous call (blocked).
    pub fn from_status(status: StatusCode, authenticated: bool, context: &str) -> Self {
        let message = format!("{} returned HTTP {}", context, status);
        let kind = match status.as_u16() {
            404 | 410 => AcquisitionErrorKind::NotFound,
            429 => AcquisitionErrorKind::RateLimited,
            401 => AcquisitionErrorKind::AuthExpired,
            403 if authenticated => AcquisitionErrorKind::AuthExpired,
            403 => AcquisitionErrorKind::BlockedAntibot,
            s if s >= 500 => AcquisitionErrorKind::Network,
            _ => AcquisitionErrorKind::Unknown,
        };
        Self::new(kind, message)
    }
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            AcquisitionError::network(e.to_string())
        } else if e.is_decode() {
            AcquisitionError::unknown(format!("Failed to decode response: {}", e))
        } else if let Some(status) = e.status() {
            AcquisitionError::from_status(status, false, "request")
        } else {
            AcquisitionError::unknown(e.to_string())
        }
    }
}

/// One acquisition method for a marketplace.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Strategy: Send + Sync {
    /// The acquisition method this strategy implements.
    fn method(&self) -> AcquisitionMethod;

    /// Make one attempt (retries are applied by the adapter).
    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError>;
}

/// Anything that can produce observations for catalog products.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current observation for a product.
    async fn fetch(&self, product: &ProductRef) -> Result<Observation, AcquisitionError>;

    /// Decorate a canonical URL with affiliate tracking for notifications.
    async fn affiliate_link(&self, product: &ProductRef, url: &str) -> String;
}

/// Ordered strategy chain for one marketplace.
pub struct SourceAdapter {
    platform: Platform,
    strategies: Vec<Box<dyn Strategy>>,
    retry: RetryPolicy,
}

impl SourceAdapter {
    pub fn new(platform: Platform, retry: RetryPolicy) -> Self {
        Self {
            platform,
            strategies: Vec::new(),
            retry,
        }
    }

    /// Append a strategy to the end of the chain.
    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn methods(&self) -> Vec<AcquisitionMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Try each strategy in order until one yields a priced observation.
    ///
    /// A strategy that answers without a price does not stop the chain, but
    /// its observation is returned if nothing better turns up. When every
    /// strategy fails, a `NOT_FOUND` from any of them wins over the last error.
    pub async fn fetch(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        let mut unpriced: Option<Observation> = None;
        let mut not_found: Option<AcquisitionError> = None;
        let mut last_error: Option<AcquisitionError> = None;

        for strategy in &self.strategies {
            let method = strategy.method();
            let label = format!("{} {}", product.label(), method.as_str());

            match retry_transient(&self.retry, &label, || strategy.attempt(product)).await {
                Ok(observation) if observation.has_price() => {
                    debug!("[SOURCE] {} succeeded", label);
                    return Ok(observation);
                }
                Ok(observation) => {
                    info!("[SOURCE] {} answered without a price, trying next", label);
                    if unpriced.is_none() {
                        unpriced = Some(observation);
                    }
                }
                Err(e) => {
                    warn!("[SOURCE] {} failed: {}", label, e);
                    if e.kind == AcquisitionErrorKind::NotFound && not_found.is_none() {
                        not_found = Some(e.clone());
                    }
                    last_error = Some(e);
                }
            }
        }

        if let Some(observation) = unpriced {
            return Ok(observation);
        }

        Err(not_found.or(last_error).unwrap_or_else(|| {
            AcquisitionError::unknown(format!(
                "No acquisition strategy configured for {}",
                self.platform
            ))
        }))
    }
}
