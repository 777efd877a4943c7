//! Configuration loading from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// One year; `chrono::Duration::hours` panics far beyond this
const MAX_COOLDOWN_HOURS: i64 = 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },

    #[error("{var} out of range: {reason}")]
    OutOfRange { var: String, reason: String },
}

/// Which price a drop is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceMode {
    /// Lowest price ever recorded
    #[default]
    HistoricalLow,
    /// Mean of the most recent history points
    MovingAverage,
}

impl ReferenceMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "historical_low" | "lowest" => Some(ReferenceMode::HistoricalLow),
            "moving_average" | "average" => Some(ReferenceMode::MovingAverage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceMode::HistoricalLow => "historical_low",
            ReferenceMode::MovingAverage => "moving_average",
        }
    }
}

/// Amazon partner API and storefront settings.
#[derive(Debug, Clone)]
pub struct AmazonConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: String,
    pub api_url: String,
    pub web_url: String,
    pub marketplace: String,
    /// Associates tag appended to alert links
    pub partner_tag: Option<String>,
}

impl AmazonConfig {
    pub fn has_api_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.partner_tag.is_some()
    }
}

/// Mercado Livre API settings.
#[derive(Debug, Clone)]
pub struct MercadoLivreConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// When set, the refresh_token grant is used instead of client_credentials
    pub refresh_token: Option<String>,
    pub api_url: String,
    pub web_url: String,
    pub affiliate_id: Option<String>,
}

impl MercadoLivreConfig {
    pub fn has_api_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Shopee affiliate open API settings.
#[derive(Debug, Clone)]
pub struct ShopeeConfig {
    pub app_id: Option<String>,
    pub app_key: Option<String>,
    pub affiliate_url: String,
    pub web_url: String,
}

impl ShopeeConfig {
    pub fn has_api_credentials(&self) -> bool {
        self.app_id.is_some() && self.app_key.is_some()
    }
}

/// Telegram bot delivery settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_url: String,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Product catalog (JSON array)
    pub catalog_path: PathBuf,

    /// Price state document
    pub state_path: PathBuf,

    /// Quarantine record
    pub quarantine_path: PathBuf,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,

    /// Backoff applied to transient acquisition failures
    pub retry: RetryPolicy,

    /// Pause between catalog items
    pub item_delay_ms: u64,
    pub item_jitter_ms: u64,

    /// Minimum drop (percent of the reference price) worth alerting
    pub drop_threshold_percent: Decimal,

    /// Minimum time between two alerts for one product
    pub cooldown_hours: i64,

    /// Prices below reference × ratio are treated as parse errors
    pub suspicious_price_ratio: Decimal,

    /// Minimum economy per reference bracket, e.g. `200:15,500:40,1500:80,*:150`
    pub economy_brackets: Option<String>,

    /// Bounded history length per product
    pub history_limit: usize,

    pub reference_mode: ReferenceMode,
    pub moving_average_window: usize,

    /// Consecutive NOT_FOUND results before quarantine
    pub quarantine_threshold: u32,
    pub purge_on_quarantine: bool,

    pub amazon: AmazonConfig,
    pub mercadolivre: MercadoLivreConfig,
    pub shopee: ShopeeConfig,
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional. Numeric variables that fail to parse
    /// abort with [`ConfigError::InvalidValue`].
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from environment variables only (no .env file).
    /// Useful for testing.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let retry = RetryPolicy {
            max_retries: parse_var("MAX_RETRIES", 2)?,
            base_delay: Duration::from_millis(parse_var("RETRY_BASE_MS", 500)?),
            max_delay: Duration::from_millis(parse_var("RETRY_MAX_MS", 8_000)?),
            jitter: Duration::from_millis(parse_var("RETRY_JITTER_MS", 400)?),
        };

        let drop_threshold_percent = parse_var("DROP_THRESHOLD_PERCENT", dec!(15))?;
        if drop_threshold_percent <= Decimal::ZERO || drop_threshold_percent >= dec!(100) {
            return Err(ConfigError::OutOfRange {
                var: "DROP_THRESHOLD_PERCENT".to_string(),
                reason: "must be between 0 and 100 (exclusive)".to_string(),
            });
        }

        let suspicious_price_ratio = parse_var("SUSPICIOUS_PRICE_RATIO", dec!(0.4))?;
        if suspicious_price_ratio < Decimal::ZERO || suspicious_price_ratio >= Decimal::ONE {
            return Err(ConfigError::OutOfRange {
                var: "SUSPICIOUS_PRICE_RATIO".to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }

        let cooldown_hours: i64 = parse_var("COOLDOWN_HOURS", 12)?;
        if !(0..=MAX_COOLDOWN_HOURS).contains(&cooldown_hours) {
            return Err(ConfigError::OutOfRange {
                var: "COOLDOWN_HOURS".to_string(),
                reason: format!("must be between 0 and {}", MAX_COOLDOWN_HOURS),
            });
        }

        let history_limit: usize = parse_var("HISTORY_LIMIT", 30)?;
        if history_limit == 0 {
            return Err(ConfigError::OutOfRange {
                var: "HISTORY_LIMIT".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let reference_mode = match optional_var("REFERENCE_MODE") {
            Some(raw) => ReferenceMode::from_str(&raw).ok_or(ConfigError::InvalidValue {
                var: "REFERENCE_MODE".to_string(),
                value: raw,
            })?,
            None => ReferenceMode::default(),
        };

        let amazon = AmazonConfig {
            client_id: optional_var("AMAZON_CLIENT_ID"),
            client_secret: optional_var("AMAZON_CLIENT_SECRET"),
            token_url: var_or("AMAZON_TOKEN_URL", "https://api.amazon.com/auth/o2/token"),
            api_url: var_or("AMAZON_API_URL", "https://webservices.amazon.com.br"),
            web_url: var_or("AMAZON_WEB_URL", "https://www.amazon.com.br"),
            marketplace: var_or("AMAZON_MARKETPLACE", "www.amazon.com.br"),
            partner_tag: optional_var("AMAZON_PARTNER_TAG"),
        };

        let mercadolivre = MercadoLivreConfig {
            client_id: optional_var("ML_CLIENT_ID"),
            client_secret: optional_var("ML_CLIENT_SECRET"),
            refresh_token: optional_var("ML_REFRESH_TOKEN"),
            api_url: var_or("ML_API_URL", "https://api.mercadolibre.com"),
            web_url: var_or("ML_WEB_URL", "https://produto.mercadolivre.com.br"),
            affiliate_id: optional_var("ML_AFFILIATE_ID"),
        };

        let shopee = ShopeeConfig {
            app_id: optional_var("SHOPEE_APP_ID"),
            app_key: optional_var("SHOPEE_APP_KEY"),
            affiliate_url: var_or(
                "SHOPEE_AFFILIATE_URL",
                "https://open-api.affiliate.shopee.com.br/graphql",
            ),
            web_url: var_or("SHOPEE_WEB_URL", "https://shopee.com.br"),
        };

        let telegram = TelegramConfig {
            bot_token: optional_var("TELEGRAM_BOT_TOKEN"),
            chat_id: optional_var("TELEGRAM_CHAT_ID"),
            api_url: var_or("TELEGRAM_API_URL", "https://api.telegram.org"),
        };

        Ok(Self {
            catalog_path: PathBuf::from(var_or("CATALOG_PATH", "products.json")),
            state_path: PathBuf::from(var_or("STATE_PATH", "price-state.json")),
            quarantine_path: PathBuf::from(var_or("QUARANTINE_PATH", "quarantine.json")),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 20)?,
            retry,
            item_delay_ms: parse_var("ITEM_DELAY_MS", 3_000)?,
            item_jitter_ms: parse_var("ITEM_JITTER_MS", 2_000)?,
            drop_threshold_percent,
            cooldown_hours,
            suspicious_price_ratio,
            economy_brackets: optional_var("ECONOMY_BRACKETS"),
            history_limit,
            reference_mode,
            moving_average_window: parse_var("MOVING_AVERAGE_WINDOW", 7)?,
            quarantine_threshold: parse_var("QUARANTINE_THRESHOLD", 3)?,
            purge_on_quarantine: parse_bool("PURGE_ON_QUARANTINE", false)?,
            amazon,
            mercadolivre,
            shopee,
            telegram,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Trimmed, non-empty value of a variable.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_var(name) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: name.to_string(),
                value: raw,
            }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "CATALOG_PATH",
        "HTTP_TIMEOUT_SECS",
        "MAX_RETRIES",
        "DROP_THRESHOLD_PERCENT",
        "COOLDOWN_HOURS",
        "SUSPICIOUS_PRICE_RATIO",
        "HISTORY_LIMIT",
        "REFERENCE_MODE",
        "PURGE_ON_QUARANTINE",
        "AMAZON_CLIENT_ID",
        "AMAZON_CLIENT_SECRET",
        "AMAZON_PARTNER_TAG",
        "TELEGRAM_BOT_TOKEN",
        "TELEGRAM_CHAT_ID",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_with_defaults() {
        clear_env();

        // Use from_env_only to test just env vars
        let config = Config::from_env_only().unwrap();

        assert_eq!(config.catalog_path, PathBuf::from("products.json"));
        assert_eq!(config.http_timeout_secs, 20);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.drop_threshold_percent, dec!(15));
        assert_eq!(config.cooldown_hours, 12);
        assert_eq!(config.suspicious_price_ratio, dec!(0.4));
        assert_eq!(config.history_limit, 30);
        assert_eq!(config.reference_mode, ReferenceMode::HistoricalLow);
        assert_eq!(config.quarantine_threshold, 3);
        assert!(!config.purge_on_quarantine);
        assert!(!config.amazon.has_api_credentials());
        assert!(!config.telegram.is_configured());
    }

    #[test]
    #[serial]
    fn test_config_overrides() {
        clear_env();
        env::set_var("CATALOG_PATH", "/data/catalog.json");
        env::set_var("DROP_THRESHOLD_PERCENT", "20.5");
        env::set_var("REFERENCE_MODE", "moving_average");
        env::set_var("PURGE_ON_QUARANTINE", "yes");
        env::set_var("AMAZON_CLIENT_ID", "id");
        env::set_var("AMAZON_CLIENT_SECRET", "secret");
        env::set_var("AMAZON_PARTNER_TAG", "tag-20");
        env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
        env::set_var("TELEGRAM_CHAT_ID", " -100 ");

        let config = Config::from_env_only().unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("/data/catalog.json"));
        assert_eq!(config.drop_threshold_percent, dec!(20.5));
        assert_eq!(config.reference_mode, ReferenceMode::MovingAverage);
        assert!(config.purge_on_quarantine);
        assert!(config.amazon.has_api_credentials());
        assert_eq!(config.telegram.chat_id.as_deref(), Some("-100"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_invalid_number() {
        clear_env();
        env::set_var("HTTP_TIMEOUT_SECS", "twenty");

        let result = Config::from_env_only();
        match result {
            Err(ConfigError::InvalidValue { var, value }) => {
                assert_eq!(var, "HTTP_TIMEOUT_SECS");
                assert_eq!(value, "twenty");
            }
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_rejects_out_of_range_policy() {
        clear_env();
        env::set_var("SUSPICIOUS_PRICE_RATIO", "1.5");
        assert!(matches!(
            Config::from_env_only(),
            Err(ConfigError::OutOfRange { .. })
        ));

        env::remove_var("SUSPICIOUS_PRICE_RATIO");
        env::set_var("HISTORY_LIMIT", "0");
        assert!(matches!(
            Config::from_env_only(),
            Err(ConfigError::OutOfRange { .. })
        ));

        env::remove_var("HISTORY_LIMIT");
        for hours in ["-5", "9999999999999"] {
            env::set_var("COOLDOWN_HOURS", hours);
            assert!(
                matches!(Config::from_env_only(), Err(ConfigError::OutOfRange { .. })),
                "COOLDOWN_HOURS={} accepted",
                hours
            );
        }
        env::set_var("COOLDOWN_HOURS", "0");
        assert_eq!(Config::from_env_only().unwrap().cooldown_hours, 0);

        clear_env();
    }

    #[test]
    fn test_reference_mode_parsing() {
        assert_eq!(
            ReferenceMode::from_str("Moving_Average"),
            Some(ReferenceMode::MovingAverage)
        );
        assert_eq!(
            ReferenceMode::from_str("lowest"),
            Some(ReferenceMode::HistoricalLow)
        );
        assert_eq!(ReferenceMode::from_str("median"), None);
    }
}
