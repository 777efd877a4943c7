//! Bearer token caching and OAuth refresh.
//!
//! [`TokenProvider`] owns the cached credential for one adapter. Time and the
//! refresh call are injected so expiry handling can be tested without real
//! time passing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::acquisition::{AcquisitionError, AcquisitionErrorKind};

/// Refresh this long before the token's stated expiry.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A bearer credential and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Performs the actual credential exchange.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch_token(&self, now: DateTime<Utc>) -> Result<AccessToken, AcquisitionError>;
}

/// Cached token with transparent refresh.
pub struct TokenProvider {
    fetcher: Box<dyn TokenFetcher>,
    clock: Arc<dyn Clock>,
    skew: chrono::Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(fetcher: Box<dyn TokenFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            clock,
            skew: chrono::Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
            cached: Mutex::new(None),
        }
    }

    pub fn with_skew(mut self, skew: chrono::Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Return a usable token, refreshing when `now >= expires_at - skew`.
    ///
    /// Any refresh failure is reported as `AUTH_EXPIRED` so the adapter can
    /// fall through to an unauthenticated strategy.
    pub async fn get_token(&self) -> Result<AccessToken, AcquisitionError> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();

        if let Some(token) = cached.as_ref() {
            if now < token.expires_at - self.skew {
                debug!("[AUTH] Using cached token (expires {})", token.expires_at);
                return Ok(token.clone());
            }
            debug!("[AUTH] Cached token expiring at {}, refreshing", token.expires_at);
        }

        match self.fetcher.fetch_token(now).await {
            Ok(token) => {
                info!("[AUTH] Obtained token valid until {}", token.expires_at);
                *cached = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!("[AUTH] Token refresh failed: {}", e);
                *cached = None;
                Err(AcquisitionError::auth_expired(format!(
                    "Token refresh failed: {}",
                    e.message
                )))
            }
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Run an authenticated call with the current token.
    ///
    /// When the call reports `AUTH_EXPIRED` the cache is dropped, the token
    /// refreshed and the call retried exactly once.
    pub async fn call_with_refresh<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
    ) -> Result<T, AcquisitionError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, AcquisitionError>>,
    {
        let token = self.get_token().await?;
        match op(token.access_token).await {
            Err(e) if e.kind == AcquisitionErrorKind::AuthExpired => {
                warn!("[AUTH] {} rejected token ({}), refreshing once", label, e.message);
                self.invalidate().await;
                let token = self.get_token().await?;
                op(token.access_token).await
            }
            other => other,
        }
    }
}

/// OAuth grant used for the token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthGrant {
    ClientCredentials,
    RefreshToken(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    refresh_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// Standard OAuth2 token endpoint client.
pub struct OAuthClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    grant: Mutex<OAuthGrant>,
    scope: Option<String>,
}

impl OAuthClient {
    pub fn new(
        client: Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        grant: OAuthGrant,
    ) -> Self {
        Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            grant: Mutex::new(grant),
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }
}

#[async_trait]
impl TokenFetcher for OAuthClient {
    async fn fetch_token(&self, now: DateTime<Utc>) -> Result<AccessToken, AcquisitionError> {
        let mut grant = self.grant.lock().await;

        let mut form = vec![
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        match &*grant {
            OAuthGrant::ClientCredentials => {
                form.push(("grant_type", "client_credentials".to_string()));
            }
            OAuthGrant::RefreshToken(refresh) => {
                form.push(("grant_type", "refresh_token".to_string()));
                form.push(("refresh_token", refresh.clone()));
            }
        }
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.clone()));
        }

        let response = self
            .client
            .post(&self.token_url)
            .timeout(Duration::from_secs(15))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AcquisitionError::auth_expired(format!(
                "Token endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AcquisitionError::auth_expired(format!("Bad token response: {}", e)))?;

        // Rotated refresh tokens replace the configured one
        if let Some(rotated) = body.refresh_token {
            let rotated = OAuthGrant::RefreshToken(rotated);
            if matches!(*grant, OAuthGrant::RefreshToken(_)) && *grant != rotated {
                info!("[AUTH] Refresh token rotated by provider");
                *grant = rotated;
            }
        }

        Ok(AccessToken {
            access_token: body.access_token,
            expires_at: now + chrono::Duration::seconds(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Manually advanced clock.
    struct FakeClock(StdMutex<DateTime<Utc>>);

    impl FakeClock {
        fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn token_fetcher(times: usize) -> MockTokenFetcher {
        let mut fetcher = MockTokenFetcher::new();
        let mut counter = 0;
        fetcher.expect_fetch_token().times(times).returning(move |now| {
            counter += 1;
            Ok(AccessToken {
                access_token: format!("token-{}", counter),
                expires_at: now + chrono::Duration::seconds(600),
            })
        });
        fetcher
    }

    #[tokio::test]
    async fn test_token_is_cached_until_skew_window() {
        let clock = Arc::new(FakeClock(StdMutex::new(Utc::now())));
        let provider = TokenProvider::new(Box::new(token_fetcher(2)), clock.clone());

        let first = provider.get_token().await.unwrap();
        assert_eq!(first.access_token, "token-1");

        // 600s lifetime, 60s skew: still valid at +539s
        clock.advance(539);
        assert_eq!(provider.get_token().await.unwrap().access_token, "token-1");

        // At +540s we are inside the skew window
        clock.advance(1);
        assert_eq!(provider.get_token().await.unwrap().access_token, "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let clock = Arc::new(FakeClock(StdMutex::new(Utc::now())));
        let provider = TokenProvider::new(Box::new(token_fetcher(2)), clock);

        provider.get_token().await.unwrap();
        provider.invalidate().await;
        assert_eq!(provider.get_token().await.unwrap().access_token, "token-2");
    }

    #[tokio::test]
    async fn test_call_with_refresh_retries_once_on_auth_expired() {
        let clock = Arc::new(FakeClock(StdMutex::new(Utc::now())));
        let provider = TokenProvider::new(Box::new(token_fetcher(2)), clock);
        let mut seen = Vec::new();

        let result = provider
            .call_with_refresh("test", |token| {
                seen.push(token.clone());
                async move {
                    if token == "token-1" {
                        Err(AcquisitionError::auth_expired("401"))
                    } else {
                        Ok(token)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "token-2");
        assert_eq!(seen, vec!["token-1", "token-2"]);
    }

    #[tokio::test]
    async fn test_call_with_refresh_gives_up_after_second_rejection() {
        let clock = Arc::new(FakeClock(StdMutex::new(Utc::now())));
        let provider = TokenProvider::new(Box::new(token_fetcher(2)), clock);
        let mut calls = 0;

        let result: Result<(), _> = provider
            .call_with_refresh("test", |_| {
                calls += 1;
                async { Err(AcquisitionError::auth_expired("403")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, AcquisitionErrorKind::AuthExpired);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_auth_expired() {
        let mut fetcher = MockTokenFetcher::new();
        fetcher
            .expect_fetch_token()
            .returning(|_| Err(AcquisitionError::network("connection refused")));
        let provider = TokenProvider::new(Box::new(fetcher), Arc::new(SystemClock));

        let err = provider.get_token().await.unwrap_err();
        assert_eq!(err.kind, AcquisitionErrorKind::AuthExpired);
    }

    #[tokio::test]
    async fn test_oauth_client_rotates_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "APP_USR-1",
                "expires_in": 21600,
                "refresh_token": "new-refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("refresh_token=new-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "APP_USR-2",
                "expires_in": 21600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth = OAuthClient::new(
            Client::new(),
            &format!("{}/oauth/token", server.uri()),
            "id",
            "secret",
            OAuthGrant::RefreshToken("old-refresh".to_string()),
        );

        let now = Utc::now();
        let first = oauth.fetch_token(now).await.unwrap();
        assert_eq!(first.access_token, "APP_USR-1");
        assert_eq!(first.expires_at, now + chrono::Duration::seconds(21600));

        let second = oauth.fetch_token(now).await.unwrap();
        assert_eq!(second.access_token, "APP_USR-2");
    }

    #[tokio::test]
    async fn test_oauth_client_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let oauth = OAuthClient::new(
            Client::new(),
            &format!("{}/token", server.uri()),
            "id",
            "secret",
            OAuthGrant::ClientCredentials,
        );

        let err = oauth.fetch_token(Utc::now()).await.unwrap_err();
        assert_eq!(err.kind, AcquisitionErrorKind::AuthExpired);
    }
}
