//! Amazon Brazil: partner API `GetItems` with HTML fallback.
//!
//! The partner API response follows the PA-API v5 shape
//! (`ItemsResult.Items[].ItemInfo.Title.DisplayValue`,
//! `Offers.Listings[].Price.Amount`, `Images.Primary.Large.URL`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acquisition::{AcquisitionError, SourceAdapter, Strategy};
use crate::config::AmazonConfig;
use crate::extract::HtmlExtractor;
use crate::http::HtmlStrategy;
use crate::models::{AcquisitionMethod, Observation, ProductRef};
use crate::platform::Platform;
use crate::retry::RetryPolicy;
use crate::token::{OAuthClient, OAuthGrant, SystemClock, TokenProvider};

const GET_ITEMS_PATH: &str = "/paapi5/getitems";

const RESOURCES: &[&str] = &[
    "ItemInfo.Title",
    "Offers.Listings.Price",
    "Images.Primary.Large",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetItemsRequest<'a> {
    item_ids: Vec<&'a str>,
    item_id_type: &'static str,
    partner_tag: &'a str,
    partner_type: &'static str,
    marketplace: &'a str,
    resources: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetItemsResponse {
    items_result: Option<ItemsResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResult {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Item {
    #[serde(rename = "DetailPageURL")]
    detail_page_url: Option<String>,
    item_info: Option<ItemInfo>,
    offers: Option<Offers>,
    images: Option<Images>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemInfo {
    title: Option<DisplayValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DisplayValue {
    display_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Offers {
    #[serde(default)]
    listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Listing {
    price: Option<ListingPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListingPrice {
    amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Images {
    primary: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageSet {
    large: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    #[serde(rename = "URL")]
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    message: String,
}

/// Product page URL for an ASIN.
pub fn product_url(web_url: &str, asin: &str) -> String {
    format!("{}/dp/{}", web_url.trim_end_matches('/'), asin)
}

/// Product page URL carrying the Associates tag.
pub fn affiliate_link(web_url: &str, asin: &str, partner_tag: Option<&str>) -> String {
    match partner_tag {
        Some(tag) => format!("{}?tag={}", product_url(web_url, asin), tag),
        None => product_url(web_url, asin),
    }
}

/// Partner API `GetItems` with a bearer credential.
pub struct AmazonApiStrategy {
    client: Client,
    api_url: String,
    web_url: String,
    partner_tag: String,
    marketplace: String,
    tokens: TokenProvider,
}

impl AmazonApiStrategy {
    pub fn new(client: Client, config: &AmazonConfig, tokens: TokenProvider) -> Option<Self> {
        Some(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.clone(),
            partner_tag: config.partner_tag.clone()?,
            marketplace: config.marketplace.clone(),
            tokens,
        })
    }

    /// Build the strategy with an OAuth client-credentials token provider.
    pub fn from_config(client: Client, config: &AmazonConfig) -> Option<Self> {
        let oauth = OAuthClient::new(
            client.clone(),
            &config.token_url,
            config.client_id.as_deref()?,
            config.client_secret.as_deref()?,
            OAuthGrant::ClientCredentials,
        );
        let tokens = TokenProvider::new(Box::new(oauth), Arc::new(SystemClock));
        Self::new(client, config, tokens)
    }

    async fn get_item(
        &self,
        product: &ProductRef,
        token: String,
    ) -> Result<Observation, AcquisitionError> {
        let request = GetItemsRequest {
            item_ids: vec![product.external_id.as_str()],
            item_id_type: "ASIN",
            partner_tag: &self.partner_tag,
            partner_type: "Associates",
            marketplace: &self.marketplace,
            resources: RESOURCES,
        };

        let response = self
            .client
            .post(format!("{}{}", self.api_url, GET_ITEMS_PATH))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AcquisitionError::from_status(
                response.status(),
                true,
                "Amazon GetItems",
            ));
        }

        let body: GetItemsResponse = response.json().await?;
        self.observation_from(product, body)
    }

    fn observation_from(
        &self,
        product: &ProductRef,
        body: GetItemsResponse,
    ) -> Result<Observation, AcquisitionError> {
        let item = match body.items_result.and_then(|r| r.items.into_iter().next()) {
            Some(item) => item,
            None => {
                let detail = body
                    .errors
                    .first()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "empty ItemsResult".to_string());
                // Not accessible to this partner tag; the page may still exist
                return Err(AcquisitionError::no_price(format!(
                    "ASIN {} not returned by GetItems ({})",
                    product.external_id, detail
                )));
            }
        };

        let price = item
            .offers
            .and_then(|o| o.listings.into_iter().next())
            .and_then(|l| l.price)
            .and_then(|p| p.amount)
            .filter(|p| *p > Decimal::ZERO);

        let title = item
            .item_info
            .and_then(|i| i.title)
            .map(|t| t.display_value)
            .or_else(|| product.title_hint.clone())
            .unwrap_or_else(|| product.external_id.clone());

        debug!("[AMAZON] GetItems {} -> {:?}", product.external_id, price);

        Ok(Observation {
            title,
            price,
            image_url: item
                .images
                .and_then(|i| i.primary)
                .and_then(|p| p.large)
                .map(|l| l.url),
            canonical_url: item
                .detail_page_url
                .unwrap_or_else(|| product_url(&self.web_url, &product.external_id)),
            method: AcquisitionMethod::PartnerApi,
        })
    }
}

#[async_trait]
impl Strategy for AmazonApiStrategy {
    fn method(&self) -> AcquisitionMethod {
        AcquisitionMethod::PartnerApi
    }

    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        self.tokens
            .call_with_refresh("Amazon GetItems", |token| self.get_item(product, token))
            .await
    }
}

/// Build the Amazon strategy chain: partner API (when configured), then HTML.
pub fn adapter(client: Client, config: &AmazonConfig, retry: RetryPolicy) -> SourceAdapter {
    let mut adapter = SourceAdapter::new(Platform::Amazon, retry);

    if config.has_api_credentials() {
        if let Some(api) = AmazonApiStrategy::from_config(client.clone(), config) {
            adapter = adapter.with_strategy(Box::new(api));
        }
    }

    let web_url = config.web_url.clone();
    adapter.with_strategy(Box::new(HtmlStrategy::new(
        client,
        HtmlExtractor::amazon(),
        move |p| product_url(&web_url, &p.external_id),
    )))
}
