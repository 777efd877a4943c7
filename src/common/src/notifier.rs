//! Alert delivery.
//!
//! [`TelegramNotifier`] sends a photo with caption when the alert carries an
//! image and falls back to a plain text message when that fails.
//! [`LogNotifier`] only logs, and is used when Telegram is not configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::models::Alert;

/// Telegram rejects photo captions longer than this.
const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Telegram rejected {method}: {description}")]
    Rejected { method: String, description: String },
}

/// Delivers qualified alerts to a human.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Channel name for logs.
    fn name(&self) -> &'static str;
}

/// Alert text in Portuguese.
pub fn format_caption(alert: &Alert) -> String {
    format!(
        "🔥 OFERTA REAL DETECTADA\n\n\
         🛒 {}\n\n\
         💰 De R$ {:.2} por R$ {:.2}\n\
         📉 Desconto: {:.1}%\n\
         💸 Economia: R$ {:.2}\n\n\
         🔗 {}",
        alert.title, alert.reference_price, alert.price, alert.drop_percent, alert.economy, alert.url
    )
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: Client, api_url: &str, bot_token: &str, chat_id: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    pub fn from_config(client: Client, config: &TelegramConfig) -> Option<Self> {
        Some(Self::new(
            client,
            &config.api_url,
            config.bot_token.as_deref()?,
            config.chat_id.as_deref()?,
        ))
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/{}", self.api_url, self.bot_token, method);
        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();

        // Telegram answers errors with a JSON body too
        let body: TelegramResponse = match response.json().await {
            Ok(body) => body,
            Err(_) => TelegramResponse {
                ok: false,
                description: Some(format!("HTTP {}", status)),
            },
        };

        if status.is_success() && body.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                method: method.to_string(),
                description: body
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            })
        }
    }

    async fn send_photo(&self, photo: &str, caption: &str) -> Result<(), NotifyError> {
        let caption: String = caption.chars().take(CAPTION_LIMIT).collect();
        self.call(
            "sendPhoto",
            json!({
                "chat_id": self.chat_id,
                "photo": photo,
                "caption": caption,
            }),
        )
        .await
    }

    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": self.chat_id,
                "text": text,
                "disable_web_page_preview": false,
            }),
        )
        .await
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let caption = format_caption(alert);

        if let Some(image) = &alert.image_url {
            match self.send_photo(image, &caption).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("[TELEGRAM] sendPhoto failed, falling back to text: {}", e),
            }
        }

        self.send_message(&caption).await
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// Writes alerts to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        info!("[ALERT] {}", alert.summary());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert(image: Option<&str>) -> Alert {
        Alert {
            platform: Platform::Amazon,
            external_id: "B0ABCDEF12".to_string(),
            title: "Air Fryer 4L".to_string(),
            price: dec!(150),
            reference_price: dec!(200),
            drop_percent: dec!(25),
            economy: dec!(50),
            url: "https://www.amazon.com.br/dp/B0ABCDEF12?tag=promo-20".to_string(),
            image_url: image.map(str::to_string),
        }
    }

    fn notifier(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(Client::new(), &server.uri(), "123:abc", "-100200")
    }

    #[test]
    fn test_caption_format() {
        let caption = format_caption(&alert(None));
        assert!(caption.starts_with("🔥 OFERTA REAL DETECTADA"));
        assert!(caption.contains("🛒 Air Fryer 4L"));
        assert!(caption.contains("De R$ 200.00 por R$ 150.00"));
        assert!(caption.contains("Desconto: 25.0%"));
        assert!(caption.contains("Economia: R$ 50.00"));
        assert!(caption.ends_with("?tag=promo-20"));
    }

    #[tokio::test]
    async fn test_photo_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .and(body_partial_json(json!({ "chat_id": "-100200", "photo": "https://img/x.jpg" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(0)
            .mount(&server)
            .await;

        notifier(&server)
            .notify(&alert(Some("https://img/x.jpg")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_photo_failure_falls_back_to_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: wrong file identifier/HTTP URL specified"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .notify(&alert(Some("https://img/broken.jpg")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_text_only_when_no_image_and_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let err = notifier(&server).notify(&alert(None)).await.unwrap_err();
        match err {
            NotifyError::Rejected {
                method,
                description,
            } => {
                assert_eq!(method, "sendMessage");
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.notify(&alert(None)).await.is_ok());
        assert_eq!(LogNotifier.name(), "log");
    }
}
