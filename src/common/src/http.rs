//! Shared HTTP client and the HTML scrape strategy used as every chain's last resort.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::{debug, warn};

use crate::acquisition::{AcquisitionError, Strategy};
use crate::extract::HtmlExtractor;
use crate::models::{AcquisitionMethod, Observation, ProductRef};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Build the client shared by all adapters.
pub fn build_http_client(timeout: Duration) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7"),
    );

    Client::builder()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// Fetch a product page.
///
/// Anti-bot markers win over the HTTP status: a captcha served with 200 or
/// 503 is reported as `BLOCKED_ANTIBOT` either way.
pub async fn fetch_html(
    client: &Client,
    url: &str,
    extractor: &HtmlExtractor,
) -> Result<String, AcquisitionError> {
    debug!("[SCRAPE] GET {}", url);

    let response = client
        .get(url)
        .header(
            ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if let Some(signature) = extractor.detect_block(&body) {
        warn!("[SCRAPE] Anti-bot page at {} (matched '{}')", url, signature);
        return Err(AcquisitionError::blocked(format!(
            "Anti-bot page detected ({})",
            signature
        )));
    }

    if !status.is_success() {
        return Err(AcquisitionError::from_status(status, false, url));
    }

    Ok(body)
}

type UrlBuilder = Box<dyn Fn(&ProductRef) -> String + Send + Sync>;

/// Fetch the public product page and extract price, title and image.
pub struct HtmlStrategy {
    client: Client,
    extractor: HtmlExtractor,
    page_url: UrlBuilder,
}

impl HtmlStrategy {
    pub fn new(
        client: Client,
        extractor: HtmlExtractor,
        page_url: impl Fn(&ProductRef) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            extractor,
            page_url: Box::new(page_url),
        }
    }
}

#[async_trait]
impl Strategy for HtmlStrategy {
    fn method(&self) -> AcquisitionMethod {
        AcquisitionMethod::HtmlScrape
    }

    async fn attempt(&self, product: &ProductRef) -> Result<Observation, AcquisitionError> {
        let url = (self.page_url)(product);
        let body = fetch_html(&self.client, &url, &self.extractor).await?;

        let price = self.extractor.extract_price_with_source(&body);
        match &price {
            Some((value, pattern)) => {
                debug!("[SCRAPE] {} price {} via {}", product.label(), value, pattern)
            }
            None => debug!("[SCRAPE] {} page has no parseable price", product.label()),
        }

        let title = self
            .extractor
            .extract_title(&body)
            .or_else(|| product.title_hint.clone())
            .unwrap_or_else(|| product.external_id.clone());

        Ok(Observation {
            title,
            price: price.map(|(value, _)| value),
            image_url: self.extractor.extract_image(&body),
            canonical_url: url,
            method: AcquisitionMethod::HtmlScrape,
        })
    }
}
