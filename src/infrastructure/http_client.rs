//! HTTP client for supplier fetches with rate limiting and error handling
//!
//! Provides a robust HTTP client shared by every connector variant, with
//! respect for upstream rate limits and proper error handling.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use tokio_util::sync::CancellationToken;

/// HTTP client configuration shared by the connector variants.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "supplier-sync/0.3".to_string(),
            timeout_seconds: 30,
            max_requests_per_second: 5,
            follow_redirects: true,
        }
    }
}

/// Request authentication applied to every call made by a client.
#[derive(Debug, Clone)]
pub enum HttpAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

/// Rate-limited HTTP client wrapping `reqwest`.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
    auth: Option<HttpAuth>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Self::with_headers(config, HeaderMap::new())
    }

    /// Create a client that authenticates every request.
    pub fn with_auth(config: HttpClientConfig, auth: HttpAuth) -> Result<Self> {
        let mut client = Self::with_headers(config, HeaderMap::new())?;
        client.auth = Some(auth);
        Ok(client)
    }

    /// Create a client with extra default headers (browser profile, etc).
    pub fn with_headers(config: HttpClientConfig, mut headers: HeaderMap) -> Result<Self> {
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
            auth: None,
        })
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(HttpAuth::Bearer(token)) => request.bearer_auth(token),
            Some(HttpAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        }
    }

    /// Fetch a URL, failing on non-2xx statuses.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self.get_raw(url, &[]).await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP request failed with status {}: {}",
                response.status(),
                url
            );
        }
        Ok(response)
    }

    /// Fetch a URL with query parameters, returning the response whatever
    /// its status. Connectors classify statuses themselves.
    pub async fn get_raw(&self, url: &str, query: &[(String, String)]) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("Fetching URL: {} (query: {:?})", url, query);

        let mut request = self.apply_auth(self.client.get(url));
        if !query.is_empty() {
            request = request.query(query);
        }
        request
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))
    }

    /// Fetch URL and return text content.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {url}"))
    }

    /// Fetch URL and return text content with cancellation support.
    pub async fn get_text_with_cancellation(
        &self,
        url: &str,
        cancellation_token: CancellationToken,
    ) -> Result<String> {
        if cancellation_token.is_cancelled() {
            anyhow::bail!("Request cancelled before starting");
        }

        tokio::select! {
            _ = self.rate_limiter.until_ready() => {},
            _ = cancellation_token.cancelled() => {
                anyhow::bail!("Request cancelled during rate limiting");
            }
        }

        let response = tokio::select! {
            result = self.apply_auth(self.client.get(url)).send() => {
                result.with_context(|| format!("Failed to fetch URL: {url}"))?
            },
            _ = cancellation_token.cancelled() => {
                tracing::warn!("🛑 HTTP request cancelled for URL: {}", url);
                anyhow::bail!("HTTP request cancelled");
            }
        };

        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP request failed with status {}: {}",
                response.status(),
                url
            );
        }

        let text = tokio::select! {
            result = response.text() => {
                result.with_context(|| format!("Failed to read response body from: {url}"))?
            },
            _ = cancellation_token.cancelled() => {
                anyhow::bail!("Response reading cancelled");
            }
        };

        Ok(text)
    }

    /// Cheapest possible round trip for connection tests.
    pub async fn head(&self, url: &str) -> Result<StatusCode> {
        self.rate_limiter.until_ready().await;
        let response = self
            .apply_auth(self.client.head(url))
            .send()
            .await
            .with_context(|| format!("Failed to reach URL: {url}"))?;
        Ok(response.status())
    }

    /// Get the configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_client_creation() {
        let config = HttpClientConfig::default();
        let client = HttpClient::new(config);
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn rejects_zero_rate_limit() {
        let config = HttpClientConfig {
            max_requests_per_second: 0,
            ..Default::default()
        };
        assert!(HttpClient::new(config).is_err());
    }

    #[tokio::test]
    async fn header_construction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );
        let client = HttpClient::with_headers(HttpClientConfig::default(), headers);
        assert!(client.is_ok());
    }
}
