//! Mercado Livre: items API (authenticated, then anonymous) with HTML fallback.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::acquisition::{AcquisitionError, SourceAdapter, Strategy};
use crate::config::MercadoLivreConfig;
use crate::extract::HtmlExtractor;
use crate::http::HtmlStrategy;
use crate::models::{AcquisitionMethod, Observation, ProductRef};
use crate::platform::Platform;
use crate::retry::RetryPolicy;
use crate::token::{OAuthClient, OAuthGrant, SystemClock, TokenProvider};

#[derive(Debug, Deserialize)]
struct MlItem {
    title: Option<String>,
    price: Option<Decimal>,
    permalink: Option<String>,
    secure_thumbnail: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    pictures: Vec<MlPicture>,
    prices: Option<MlPrices>,
}

#[derive(Debug, Deserialize)]
struct MlPicture {
    secure_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MlPrices {
    #[serde(default)]
    prices: Vec<MlPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct MlPriceEntry {
    amount: Option<Decimal>,
}

/// Storefront URL for an item id (`MLB123` -> `.../MLB-123`).
pub fn product_url(web_url: &str, item_id: &str) -> String {
    let (site, number) = item_id.split_at(item_id.len().min(3));
    format!("{}/{}-{}", web_url.trim_end_matches('/'), site, number)
}

/// Append the affiliate `matt_tool` parameter to a permalink.
pub fn affiliate_link(permalink: &str, affiliate_id: Option<&str>) -> String {
    let Some(id) = affiliate_id else {
        return permalink.to_string();
    };
    match Url::parse(permalink) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("matt_tool", id);
            url.to_string()
        }
        Err(_) => permalink.to_string(),
    }
}

/// Shared `GET /items/{id}` call, with or without a bearer token.
struct ItemsApi {
    client: Client,
    api_url: String,
    web_url: String,
}

impl ItemsApi {
    async fn get_item(
        &self,
        product: &ProductRef,
        token: Option<String>,
        method: AcquisitionMethod,
    ) -> Result<Observation, AcquisitionError> {
        let url = format!("{}/items/{}", self.api_url, product.external_id);
        let mut request = self.client.get(&url);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AcquisitionError::from_status(
                response.status(),
                token.is_some(),
                "Mercado Livre items API",
            ));
        }

        let item: MlItem = response.json().await?;
        Ok(self.observation_from(product, item, method))
    }

    fn observation_from(
        &self,
        product: &ProductRef,
        item: MlItem,
        method: AcquisitionMethod,
    ) -> Observation {
        // `price` is null on some catalog listings; the price table carries it instead
        let price = item
            .price
            .filter(|p| *p > Decimal::ZERO)
            .or_else(|| {
                item.prices
                    .and_then(|p| p.prices.into_iter().find_map(|e| e.amount))
                    .filter(|p| *p > Decimal::ZERO)
            });

        debug!("[ML] items/{} -> {:?} via {}", product.external_id, price, method.as_str());

        let image_url = item
            .pictures
            .into_iter()
            .find_map(|p| p.secure_url)
            .or(item.secure_thumbnail)
            .or(item.thumbnail);

        Observation {
            title: item
                .title
                .or_else(|| product.title_hint.clone())
                .unwrap_or_else(|| product.external_id.clone()),
            price,
            image_url,
            canonical_url: item
                .permalink
                .unwrap_or_else(|| product_url(&self.web_url, &product.external_id)),
            method,
        }
    }
}

/// Items API with an OAuth bearer credential.
pub struct MlAuthenticatedStrategy {
    api: ItemsApi,
    tokens: TokenProvider,
}

impl MlAuthenticatedStrategy {
    pub fn new(client: Client, config: &MercadoLivreConfig, tokens: TokenProvider) -> Self {
        Self {
            api: ItemsApi {
                client,
                api_url: config.api_url.trim_end_matches('/').to_string(),
                web_url: config.web_url.clone(),
            },
            tokens,
        }
    }

    /// Uses the refresh_token grant when a refresh token is configured.
    pub fn from_config(client: Client, config: &MercadoLivreConfig) -> Option<Self> {
        let grant = match &config.refresh_token {
            Some(refresh) => OAuthGrant::RefreshToken(refresh.clone()),
            None => OAuthGrant::ClientCredentials,
        };
        let oauth = OAuthClient::new(
            client.clone(),
            &format!("{}/oauth/token", config.api_url.trim_end_matches('/')),
            config.client_id.as_deref()?,
            config.client_secret.as_deref()?,
            grant,
        );
        let tokens = TokenProvider::new(Box::new(oauth), Arc::new(SystemClock));
        Some(Self::new(client, config, tokens))
    }
}

#[async_trait]
impl Strategy for MlAuthenticatedStrategy {
    fn method(&self) -> AcquisitionMethod {
        AcquisitionMethod::PartnerApi
    }

    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        self.tokens
            .call_with_refresh("Mercado Livre items API", |token| {
                self.api
                    .get_item(product, Some(token), AcquisitionMethod::PartnerApi)
            })
            .await
    }
}

/// Items API without credentials.
pub struct MlPublicStrategy {
    api: ItemsApi,
}

impl MlPublicStrategy {
    pub fn new(client: Client, config: &MercadoLivreConfig) -> Self {
        Self {
            api: ItemsApi {
                client,
                api_url: config.api_url.trim_end_matches('/').to_string(),
                web_url: config.web_url.clone(),
            },
        }
    }
}

#[async_trait]
impl Strategy for MlPublicStrategy {
    fn method(&self) -> AcquisitionMethod {
        AcquisitionMethod::PublicApi
    }

    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        self.api
            .get_item(product, None, AcquisitionMethod::PublicApi)
            .await
    }
}

/// Build the Mercado Livre chain: bearer API (when configured), anonymous API, HTML.
pub fn adapter(client: Client, config: &MercadoLivreConfig, retry: RetryPolicy) -> SourceAdapter {
    let mut adapter = SourceAdapter::new(Platform::MercadoLivre, retry);

    if config.has_api_credentials() {
        if let Some(auth) = MlAuthenticatedStrategy::from_config(client.clone(), config) {
            adapter = adapter.with_strategy(Box::new(auth));
        }
    }

    let web_url = config.web_url.clone();
    adapter
        .with_strategy(Box::new(MlPublicStrategy::new(client.clone(), config)))
        .with_strategy(Box::new(HtmlStrategy::new(
            client,
            HtmlExtractor::mercadolivre(),
            move |p| product_url(&web_url, &p.external_id),
        )))
}
