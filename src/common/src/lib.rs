//! Common library for the pricewatch services.
//!
//! Provides shared functionality:
//! - Configuration loading from .env
//! - Marketplace acquisition chains (partner API, public API, HTML scrape)
//! - Price state store, catalog and quarantine files
//! - Alert notifiers
//! - Shared data models

pub mod acquisition;
pub mod amazon;
pub mod catalog;
pub mod config;
pub mod extract;
pub mod http;
pub mod mercadolivre;
pub mod models;
pub mod notifier;
pub mod persist;
pub mod platform;
pub mod quarantine;
pub mod retry;
pub mod shopee;
pub mod sources;
pub mod store;
pub mod token;

pub use acquisition::{AcquisitionError, AcquisitionErrorKind, PriceSource, SourceAdapter, Strategy};
pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use config::{Config, ConfigError, ReferenceMode};
pub use models::{AcquisitionMethod, Alert, Observation, PricePoint, ProductRef, ProductState};
pub use notifier::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use platform::Platform;
pub use quarantine::{QuarantineLog, QuarantineRecord};
pub use retry::RetryPolicy;
pub use sources::Sources;
pub use store::{PriceStore, StoreDocument, StoreError};
