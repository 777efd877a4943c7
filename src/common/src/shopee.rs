//! Shopee Brazil: affiliate GraphQL, public item JSON and HTML fallback.
//!
//! Affiliate calls are signed with
//! `SHA256(app_id + timestamp + payload + app_key)` in the `Authorization`
//! header. The same signed client generates the short links used in alerts.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::acquisition::{AcquisitionError, AcquisitionErrorKind, SourceAdapter, Strategy};
use crate::config::ShopeeConfig;
use crate::extract::{parse_machine_price, HtmlExtractor};
use crate::http::HtmlStrategy;
use crate::models::{AcquisitionMethod, Observation, ProductRef};
use crate::platform::Platform;
use crate::retry::RetryPolicy;

/// Public item API prices are integers scaled by this factor.
const PUBLIC_PRICE_SCALE: Decimal = dec!(100000);

const IMAGE_CDN: &str = "https://down-br.img.susercontent.com/file";

/// Sub ids attached to generated short links for conversion reports.
const SHORT_LINK_SUB_IDS: &[&str] = &["telegram", "monitor_precos"];

/// Split a `shop.item` identifier.
pub fn split_id(external_id: &str) -> Option<(&str, &str)> {
    external_id.split_once('.')
}

pub fn product_url(web_url: &str, external_id: &str) -> String {
    let web_url = web_url.trim_end_matches('/');
    match split_id(external_id) {
        Some((shop, item)) => format!("{}/product/{}/{}", web_url, shop, item),
        None => format!("{}/product/{}", web_url, external_id),
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorExtensions {
    code: Option<i64>,
}

/// Signed client for the affiliate open API.
#[derive(Clone)]
pub struct ShopeeAffiliateClient {
    client: Client,
    url: String,
    app_id: String,
    app_key: String,
}

impl ShopeeAffiliateClient {
    pub fn new(client: Client, url: &str, app_id: &str, app_key: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            app_id: app_id.to_string(),
            app_key: app_key.to_string(),
        }
    }

    pub fn from_config(client: Client, config: &ShopeeConfig) -> Option<Self> {
        Some(Self::new(
            client,
            &config.affiliate_url,
            config.app_id.as_deref()?,
            config.app_key.as_deref()?,
        ))
    }

    /// Hex SHA-256 over `app_id + timestamp + payload + app_key`.
    pub fn sign(&self, timestamp: i64, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.app_id.as_bytes());
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(payload.as_bytes());
        hasher.update(self.app_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn execute<T: DeserializeOwned>(&self, query: String) -> Result<T, AcquisitionError> {
        let payload = serde_json::json!({ "query": query }).to_string();
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(timestamp, &payload);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(
                "Authorization",
                format!(
                    "SHA256 Credential={}, Timestamp={}, Signature={}",
                    self.app_id, timestamp, signature
                ),
            )
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AcquisitionError::from_status(
                response.status(),
                true,
                "Shopee affiliate API",
            ));
        }

        let body: GraphqlResponse<T> = response.json().await?;
        if let Some(error) = body.errors.first() {
            return Err(classify_graphql_error(error));
        }
        body.data
            .ok_or_else(|| AcquisitionError::unknown("Shopee affiliate API returned no data"))
    }

    /// Offer for one item, if the affiliate catalog has it.
    async fn product_offer(&self, shop_id: &str, item_id: &str) -> Result<Option<OfferNode>, AcquisitionError> {
        let query = format!(
            "{{productOfferV2(shopId:{},itemId:{}){{nodes{{itemId productName price priceMin imageUrl productLink offerLink}}}}}}",
            shop_id, item_id
        );
        let data: ProductOfferData = self.execute(query).await?;
        Ok(data.product_offer_v2.nodes.into_iter().next())
    }

    /// Short tracking link for an origin URL.
    pub async fn generate_short_link(&self, origin_url: &str) -> Result<String, AcquisitionError> {
        let sub_ids = SHORT_LINK_SUB_IDS
            .iter()
            .map(|s| format!("\"{}\"", s))
            .collect::<Vec<_>>()
            .join(",");
        let query = format!(
            "mutation{{generateShortLink(input:{{originUrl:{},subIds:[{}]}}){{shortLink}}}}",
            serde_json::Value::String(origin_url.to_string()),
            sub_ids
        );
        let data: ShortLinkData = self.execute(query).await?;
        data.generate_short_link
            .short_link
            .filter(|l| !l.is_empty())
            .ok_or_else(|| AcquisitionError::unknown("generateShortLink returned no link"))
    }

    /// Short link, or the origin URL when generation fails.
    pub async fn short_link_or_origin(&self, origin_url: &str) -> String {
        match self.generate_short_link(origin_url).await {
            Ok(link) => link,
            Err(e) => {
                warn!("[SHOPEE] Short link generation failed, using origin URL: {}", e);
                origin_url.to_string()
            }
        }
    }
}

fn classify_graphql_error(error: &GraphqlError) -> AcquisitionError {
    let code = error.extensions.as_ref().and_then(|e| e.code);
    let kind = match code {
        // invalid credential / signature / timestamp
        Some(10020) | Some(10031) | Some(10032) => AcquisitionErrorKind::AuthExpired,
        Some(10030) => AcquisitionErrorKind::RateLimited,
        // business errors (item not offered); not proof of a delisting
        Some(c) if (11000..12000).contains(&c) => AcquisitionErrorKind::NoPrice,
        _ => AcquisitionErrorKind::Unknown,
    };
    AcquisitionError::new(
        kind,
        format!("Shopee GraphQL error {:?}: {}", code, error.message),
    )
}

#[derive(Debug, Deserialize)]
struct ProductOfferData {
    #[serde(rename = "productOfferV2")]
    product_offer_v2: ProductOfferConnection,
}

#[derive(Debug, Deserialize)]
struct ProductOfferConnection {
    #[serde(default)]
    nodes: Vec<OfferNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferNode {
    product_name: Option<String>,
    price: Option<String>,
    price_min: Option<String>,
    image_url: Option<String>,
    product_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShortLinkData {
    #[serde(rename = "generateShortLink")]
    generate_short_link: ShortLinkResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortLinkResult {
    short_link: Option<String>,
}

/// Affiliate `productOfferV2` lookup.
pub struct ShopeeAffiliateStrategy {
    api: ShopeeAffiliateClient,
    web_url: String,
}

impl ShopeeAffiliateStrategy {
    pub fn new(api: ShopeeAffiliateClient, web_url: &str) -> Self {
        Self {
            api,
            web_url: web_url.to_string(),
        }
    }
}

#[async_trait]
impl Strategy for ShopeeAffiliateStrategy {
    fn method(&self) -> AcquisitionMethod {
        AcquisitionMethod::PartnerApi
    }

    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        let (shop_id, item_id) = split_id(&product.external_id).ok_or_else(|| {
            AcquisitionError::not_found(format!("Malformed Shopee id {}", product.external_id))
        })?;

        let node = self.api.product_offer(shop_id, item_id).await?.ok_or_else(|| {
            AcquisitionError::no_price(format!(
                "Item {} not in affiliate catalog",
                product.external_id
            ))
        })?;

        let price = node
            .price_min
            .as_deref()
            .and_then(parse_machine_price)
            .or_else(|| node.price.as_deref().and_then(parse_machine_price));
        debug!("[SHOPEE] productOfferV2 {} -> {:?}", product.external_id, price);

        Ok(Observation {
            title: node
                .product_name
                .or_else(|| product.title_hint.clone())
                .unwrap_or_else(|| product.external_id.clone()),
            price,
            image_url: node.image_url,
            canonical_url: node
                .product_link
                .unwrap_or_else(|| product_url(&self.web_url, &product.external_id)),
            method: AcquisitionMethod::PartnerApi,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PublicItemResponse {
    data: Option<PublicItem>,
    error: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PublicItem {
    name: Option<String>,
    price: Option<i64>,
    price_min: Option<i64>,
    image: Option<String>,
}

/// Anonymous `api/v4/item/get` endpoint of the storefront.
pub struct ShopeePublicStrategy {
    client: Client,
    web_url: String,
}

impl ShopeePublicStrategy {
    pub fn new(client: Client, web_url: &str) -> Self {
        Self {
            client,
            web_url: web_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Convert a scaled public API price to currency units.
fn scaled_price(raw: i64) -> Option<Decimal> {
    (raw > 0).then(|| Decimal::from(raw) / PUBLIC_PRICE_SCALE)
}

#[async_trait]
impl Strategy for ShopeePublicStrategy {
    fn method(&self) -> AcquisitionMethod {
        AcquisitionMethod::PublicApi
    }

    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        let (shop_id, item_id) = split_id(&product.external_id).ok_or_else(|| {
            AcquisitionError::not_found(format!("Malformed Shopee id {}", product.external_id))
        })?;

        let response = self
            .client
            .get(format!("{}/api/v4/item/get", self.web_url))
            .query(&[("itemid", item_id), ("shopid", shop_id)])
            .header("Referer", product_url(&self.web_url, &product.external_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AcquisitionError::from_status(
                response.status(),
                false,
                "Shopee item API",
            ));
        }

        let body: PublicItemResponse = response.json().await?;
        let item = match (body.data, body.error) {
            (Some(item), _) => item,
            (None, Some(4)) => {
                return Err(AcquisitionError::not_found(format!(
                    "Shopee item {} does not exist",
                    product.external_id
                )))
            }
            (None, Some(90309999)) => {
                return Err(AcquisitionError::blocked("Shopee item API anti-crawler response"))
            }
            (None, code) => {
                return Err(AcquisitionError::unknown(format!(
                    "Shopee item API returned no data (error {:?})",
                    code
                )))
            }
        };

        let price = item
            .price_min
            .and_then(scaled_price)
            .or_else(|| item.price.and_then(scaled_price));

        Ok(Observation {
            title: item
                .name
                .or_else(|| product.title_hint.clone())
                .unwrap_or_else(|| product.external_id.clone()),
            price,
            image_url: item.image.map(|hash| format!("{}/{}", IMAGE_CDN, hash)),
            canonical_url: product_url(&self.web_url, &product.external_id),
            method: AcquisitionMethod::PublicApi,
        })
    }
}

/// Build the Shopee chain: affiliate GraphQL (when configured), public JSON, HTML.
pub fn adapter(client: Client, config: &ShopeeConfig, retry: RetryPolicy) -> SourceAdapter {
    let mut adapter = SourceAdapter::new(Platform::Shopee, retry);

    if let Some(api) = ShopeeAffiliateClient::from_config(client.clone(), config) {
        adapter = adapter.with_strategy(Box::new(ShopeeAffiliateStrategy::new(api, &config.web_url)));
    }

    let web_url = config.web_url.clone();
    adapter
        .with_strategy(Box::new(ShopeePublicStrategy::new(client.clone(), &config.web_url)))
        .with_strategy(Box::new(HtmlStrategy::new(
            client,
            HtmlExtractor::shopee(),
            move |p| product_url(&web_url, &p.external_id),
        )))
}
