//! Registry of per-marketplace adapters behind a single [`PriceSource`].

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::acquisition::{AcquisitionError, PriceSource, SourceAdapter};
use crate::config::Config;
use crate::http::build_http_client;
use crate::models::{AcquisitionMethod, Observation, ProductRef};
use crate::platform::Platform;
use crate::shopee::ShopeeAffiliateClient;
use crate::{amazon, mercadolivre, shopee};

/// Affiliate settings used when building alert links.
#[derive(Clone, Default)]
pub struct AffiliateLinks {
    pub amazon_web_url: String,
    pub amazon_partner_tag: Option<String>,
    pub ml_affiliate_id: Option<String>,
    pub shopee: Option<ShopeeAffiliateClient>,
}

impl AffiliateLinks {
    pub fn from_config(client: Client, config: &Config) -> Self {
        Self {
            amazon_web_url: config.amazon.web_url.clone(),
            amazon_partner_tag: config.amazon.partner_tag.clone(),
            ml_affiliate_id: config.mercadolivre.affiliate_id.clone(),
            shopee: ShopeeAffiliateClient::from_config(client, &config.shopee),
        }
    }

    pub async fn link_for(&self, product: &ProductRef, url: &str) -> String {
        match product.platform {
            Platform::Amazon => amazon::affiliate_link(
                &self.amazon_web_url,
                &product.external_id,
                self.amazon_partner_tag.as_deref(),
            ),
            Platform::MercadoLivre => {
                mercadolivre::affiliate_link(url, self.ml_affiliate_id.as_deref())
            }
            Platform::Shopee => match &self.shopee {
                Some(api) => api.short_link_or_origin(url).await,
                None => url.to_string(),
            },
        }
    }
}

/// All configured adapters keyed by platform.
pub struct Sources {
    adapters: HashMap<Platform, SourceAdapter>,
    links: AffiliateLinks,
}

impl Sources {
    pub fn new(links: AffiliateLinks) -> Self {
        Self {
            adapters: HashMap::new(),
            links,
        }
    }

    pub fn with_adapter(mut self, adapter: SourceAdapter) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    /// Build every marketplace chain from configuration.
    pub fn from_config(config: &Config) -> Self {
        let client = build_http_client(config.http_timeout());
        let sources = Self::new(AffiliateLinks::from_config(client.clone(), config))
            .with_adapter(amazon::adapter(client.clone(), &config.amazon, config.retry.clone()))
            .with_adapter(mercadolivre::adapter(
                client.clone(),
                &config.mercadolivre,
                config.retry.clone(),
            ))
            .with_adapter(shopee::adapter(client, &config.shopee, config.retry.clone()));

        for (platform, methods) in sources.describe() {
            let chain: Vec<&str> = methods.iter().map(|m| m.as_str()).collect();
            info!("[SOURCE] {} chain: {}", platform.display_name(), chain.join(" -> "));
        }
        sources
    }

    /// Strategy chain of each configured platform, in platform order.
    pub fn describe(&self) -> Vec<(Platform, Vec<AcquisitionMethod>)> {
        Platform::ALL
            .iter()
            .filter_map(|p| self.adapters.get(p).map(|a| (*p, a.methods())))
            .collect()
    }
}

#[async_trait]
impl PriceSource for Sources {
    async fn fetch(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        match self.adapters.get(&product.platform) {
            Some(adapter) => adapter.fetch(product).await,
            None => Err(AcquisitionError::unknown(format!(
                "No adapter configured for {}",
                product.platform
            ))),
        }
    }

    async fn affiliate_link(&self, product: &ProductRef, url: &str) -> String {
        self.links.link_for(product, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AcquisitionErrorKind, MockStrategy};
    use crate::retry::RetryPolicy;
    use rust_decimal_macros::dec;

    fn links() -> AffiliateLinks {
        AffiliateLinks {
            amazon_web_url: "https://www.amazon.com.br".to_string(),
            amazon_partner_tag: Some("promo-20".to_string()),
            ml_affiliate_id: Some("4242".to_string()),
            shopee: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_routes_by_platform() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_method()
            .return_const(AcquisitionMethod::PublicApi);
        strategy.expect_attempt().times(1).returning(|_| {
            Ok(Observation {
                title: "Item".to_string(),
                price: Some(dec!(10)),
                image_url: None,
                canonical_url: "https://x".to_string(),
                method: AcquisitionMethod::PublicApi,
            })
        });

        let sources = Sources::new(links()).with_adapter(
            SourceAdapter::new(Platform::MercadoLivre, RetryPolicy::default())
                .with_strategy(Box::new(strategy)),
        );

        let obs = sources
            .fetch(&ProductRef::new(Platform::MercadoLivre, "MLB1"))
            .await
            .unwrap();
        assert_eq!(obs.price, Some(dec!(10)));

        let err = sources
            .fetch(&ProductRef::new(Platform::Amazon, "B000000000"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AcquisitionErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_affiliate_links_per_platform() {
        let sources = Sources::new(links());

        assert_eq!(
            sources
                .affiliate_link(&ProductRef::new(Platform::Amazon, "B0ABCDEF12"), "ignored")
                .await,
            "https://www.amazon.com.br/dp/B0ABCDEF12?tag=promo-20"
        );
        assert_eq!(
            sources
                .affiliate_link(
                    &ProductRef::new(Platform::MercadoLivre, "MLB1"),
                    "https://produto.mercadolivre.com.br/MLB-1"
                )
                .await,
            "https://produto.mercadolivre.com.br/MLB-1?matt_tool=4242"
        );
        // No affiliate credentials: origin URL unchanged
        assert_eq!(
            sources
                .affiliate_link(
                    &ProductRef::new(Platform::Shopee, "1.2"),
                    "https://shopee.com.br/product/1/2"
                )
                .await,
            "https://shopee.com.br/product/1/2"
        );
    }
}
