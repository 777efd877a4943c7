//! HTML price/title/image extraction and anti-bot detection.
//!
//! Patterns are ordered from most reliable (structured data) to most generic
//! (a currency scan over the whole document); the first one that yields a
//! finite positive price wins.

use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;

use crate::platform::Platform;

/// How the captured text of a price pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFormat {
    /// Machine-readable, dot as decimal separator (`1299.90`)
    Machine,
    /// Displayed text with locale separators (`R$ 1.299,90`)
    Localized,
    /// Whole units in group 1, optional cents in group 2
    Split,
}

struct PricePattern {
    name: &'static str,
    regex: Regex,
    format: PriceFormat,
}

/// Ordered extraction rules for one marketplace.
pub struct HtmlExtractor {
    price_patterns: Vec<PricePattern>,
    title_patterns: Vec<Regex>,
    image_patterns: Vec<Regex>,
    block_signatures: Vec<&'static str>,
}

const OG_TITLE: &str = r#"<meta[^>]+property="og:title"[^>]+content="([^"]+)""#;
const OG_TITLE_REVERSED: &str = r#"<meta[^>]+content="([^"]+)"[^>]+property="og:title""#;
const HTML_TITLE: &str = r"(?is)<title[^>]*>\s*([^<]+?)\s*</title>";
const OG_IMAGE: &str = r#"<meta[^>]+property="og:image"[^>]+content="([^"]+)""#;
const OG_IMAGE_REVERSED: &str = r#"<meta[^>]+content="([^"]+)"[^>]+property="og:image""#;
const ITEMPROP_PRICE: &str = r#"<meta[^>]+itemprop="price"[^>]+content="([0-9]+(?:\.[0-9]+)?)""#;
const JSONLD_OFFER_PRICE: &str =
    r#"(?s)"@type"\s*:\s*"Offer".{0,400}?"price"\s*:\s*"?([0-9]+(?:\.[0-9]+)?)"#;
const GENERIC_BRL: &str = r"R\$(?:&nbsp;|\s|\x{a0})*(\d{1,3}(?:\.\d{3})*(?:,\d{2})?)";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("extraction pattern must compile")
}

fn price(name: &'static str, pattern: &str, format: PriceFormat) -> PricePattern {
    PricePattern {
        name,
        regex: compile(pattern),
        format,
    }
}

impl HtmlExtractor {
    /// Extraction rules for a platform's product page.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Amazon => Self::amazon(),
            Platform::MercadoLivre => Self::mercadolivre(),
            Platform::Shopee => Self::shopee(),
        }
    }

    pub fn amazon() -> Self {
        Self {
            price_patterns: vec![
                price(
                    "price_amount_json",
                    r#""priceAmount"\s*:\s*([0-9]+(?:\.[0-9]+)?)"#,
                    PriceFormat::Machine,
                ),
                price("itemprop_price", ITEMPROP_PRICE, PriceFormat::Machine),
                price(
                    "a_price_split",
                    r#"a-price-whole">([\d.]+)[.,]?(?:<span class="a-price-decimal">[.,]</span>)?</span>\s*<span class="a-price-fraction">(\d{2})</span>"#,
                    PriceFormat::Split,
                ),
                price(
                    "a_offscreen",
                    r#"class="a-offscreen">\s*R\$(?:&nbsp;|\s|\x{a0})*([\d.,]+)\s*<"#,
                    PriceFormat::Localized,
                ),
                price("generic_brl", GENERIC_BRL, PriceFormat::Localized),
            ],
            title_patterns: vec![
                compile(r#"(?s)id="productTitle"[^>]*>\s*([^<]+?)\s*<"#),
                compile(OG_TITLE),
                compile(OG_TITLE_REVERSED),
                compile(HTML_TITLE),
            ],
            image_patterns: vec![
                compile(r#"data-old-hires="(https://[^"]+)""#),
                compile(r#""hiRes"\s*:\s*"(https://[^"]+)""#),
                compile(OG_IMAGE),
                compile(OG_IMAGE_REVERSED),
            ],
            block_signatures: vec![
                "/errors/validatecaptcha",
                "robot check",
                "type the characters you see in this image",
                "digite os caracteres que você vê abaixo",
                "api-services-support@amazon.com",
            ],
        }
    }

    pub fn mercadolivre() -> Self {
        Self {
            price_patterns: vec![
                price("itemprop_price", ITEMPROP_PRICE, PriceFormat::Machine),
                price("jsonld_offer", JSONLD_OFFER_PRICE, PriceFormat::Machine),
                price(
                    "andes_money_amount",
                    r#"andes-money-amount__fraction"[^>]*>([\d.]+)</span>(?:<span[^>]*>,</span><span class="andes-money-amount__cents[^"]*"[^>]*>(\d{2})</span>)?"#,
                    PriceFormat::Split,
                ),
                price("generic_brl", GENERIC_BRL, PriceFormat::Localized),
            ],
            title_patterns: vec![
                compile(r#"class="ui-pdp-title"[^>]*>\s*([^<]+?)\s*<"#),
                compile(OG_TITLE),
                compile(OG_TITLE_REVERSED),
                compile(HTML_TITLE),
            ],
            image_patterns: vec![
                compile(OG_IMAGE),
                compile(OG_IMAGE_REVERSED),
                compile(r#"class="ui-pdp-image[^"]*"[^>]+src="(https://[^"]+)""#),
            ],
            block_signatures: vec![
                "/gz/account-verification",
                "negative_traffic",
                "suspicious-traffic",
                "g-recaptcha",
            ],
        }
    }

    pub fn shopee() -> Self {
        Self {
            price_patterns: vec![
                price(
                    "og_price_amount",
                    r#"<meta[^>]+property="product:price:amount"[^>]+content="([0-9]+(?:\.[0-9]+)?)""#,
                    PriceFormat::Machine,
                ),
                price("jsonld_offer", JSONLD_OFFER_PRICE, PriceFormat::Machine),
                price("generic_brl", GENERIC_BRL, PriceFormat::Localized),
            ],
            title_patterns: vec![
                compile(OG_TITLE),
                compile(OG_TITLE_REVERSED),
                compile(HTML_TITLE),
            ],
            image_patterns: vec![compile(OG_IMAGE), compile(OG_IMAGE_REVERSED)],
            block_signatures: vec!["/verify/traffic", "/verify/captcha", "g-recaptcha"],
        }
    }

    /// Return the first block signature found in the body, if any.
    pub fn detect_block(&self, body: &str) -> Option<&'static str> {
        let lower = body.to_lowercase();
        self.block_signatures
            .iter()
            .find(|sig| lower.contains(*sig))
            .copied()
    }

    /// First pattern match that parses to a finite positive price.
    pub fn extract_price(&self, body: &str) -> Option<Decimal> {
        self.extract_price_with_source(body).map(|(price, _)| price)
    }

    /// Like [`extract_price`](Self::extract_price), also naming the pattern.
    pub fn extract_price_with_source(&self, body: &str) -> Option<(Decimal, &'static str)> {
        for pattern in &self.price_patterns {
            for caps in pattern.regex.captures_iter(body) {
                let parsed = match pattern.format {
                    PriceFormat::Machine => caps.get(1).and_then(|m| parse_machine_price(m.as_str())),
                    PriceFormat::Localized => caps.get(1).and_then(|m| parse_price_text(m.as_str())),
                    PriceFormat::Split => caps.get(1).and_then(|whole| match caps.get(2) {
                        Some(cents) => {
                            parse_price_text(&format!("{},{}", whole.as_str(), cents.as_str()))
                        }
                        None => parse_price_text(whole.as_str()),
                    }),
                };
                if let Some(price) = parsed {
                    return Some((price, pattern.name));
                }
            }
        }
        None
    }

    pub fn extract_title(&self, body: &str) -> Option<String> {
        first_capture(&self.title_patterns, body)
            .map(|t| decode_entities(&t))
            .filter(|t| !t.is_empty())
    }

    pub fn extract_image(&self, body: &str) -> Option<String> {
        first_capture(&self.image_patterns, body).map(|u| decode_entities(&u))
    }
}

fn first_capture(patterns: &[Regex], body: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Decode the handful of entities that show up in titles and URLs.
pub fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a machine-formatted price (`1299.90`).
pub fn parse_machine_price(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim())
        .ok()
        .filter(|d| *d > Decimal::ZERO)
}

/// Parse a displayed price, normalizing locale separators.
///
/// Handles `R$ 1.234,56`, `1,234.56`, `1.299` (thousands), `12,5` and
/// non-breaking spaces. Returns `None` for anything that is not a finite
/// positive number.
pub fn parse_price_text(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .replace("&nbsp;", " ")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = cleaned.len() - comma - 1;
            if cleaned.matches(',').count() > 1 || decimals == 3 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (Some(dot), None) => {
            let decimals = cleaned.len() - dot - 1;
            if cleaned.matches('.').count() > 1 || decimals == 3 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    Decimal::from_str(&normalized)
        .ok()
        .filter(|d| *d > Decimal::ZERO)
}
