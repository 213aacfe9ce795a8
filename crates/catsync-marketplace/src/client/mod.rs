//! HTTP client for the marketplace catalog and supplies APIs.

mod scan;
mod supplies;

use std::time::Duration;

use catsync_core::AppConfig;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use crate::error::{truncate_body, MarketplaceError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::token::Credentials;

pub use reqwest::Method;
pub use supplies::SupplyStats;

const DEFAULT_USER_AGENT: &str = "catsync/0.1 (catalog-sync)";

/// Everything a [`MarketplaceClient`] needs, passed in explicitly at
/// construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    pub credentials: Credentials,
}

impl ClientConfig {
    /// Client settings for the catalog (content) API.
    #[must_use]
    pub fn catalog(config: &AppConfig) -> Self {
        Self::with_base_url(config, &config.catalog_base_url)
    }

    /// Client settings for the supplies API.
    #[must_use]
    pub fn supplies(config: &AppConfig) -> Self {
        Self::with_base_url(config, &config.supplies_base_url)
    }

    fn with_base_url(config: &AppConfig, base_url: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
            timeout_secs: config.request_timeout_secs,
            retry: RetryPolicy::from_millis(
                config.retry_max_attempts,
                config.retry_initial_delay_ms,
                config.retry_max_delay_ms,
            ),
            credentials: Credentials::new(
                config.marketplace_token.clone(),
                config.marketplace_token_fallback.clone(),
            ),
        }
    }
}

/// Client for one marketplace API base URL.
///
/// Every request carries the raw token in `Authorization` (no `Bearer`
/// prefix). HTTP 429 and 5xx responses are retried with exponential backoff;
/// any other non-2xx status fails immediately with
/// [`MarketplaceError::Remote`].
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    credentials: Credentials,
}

impl MarketplaceClient {
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`MarketplaceError::InvalidUrl`] if
    /// `config.base_url` does not parse.
    pub fn new(config: ClientConfig) -> Result<Self, MarketplaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        // Ensure exactly one trailing slash so relative paths join under the
        // base path instead of replacing its last segment.
        let normalised = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| MarketplaceError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            retry: config.retry,
            credentials: config.credentials,
        })
    }

    /// Sends one JSON request to `path` (relative to the base URL) and
    /// returns the parsed response body. An empty 2xx body is returned as
    /// `Value::Null`.
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::Config`]: no usable token. Checked before any
    ///   network call.
    /// - [`MarketplaceError::ExhaustedRetries`]: every attempt hit 429/5xx or
    ///   a network failure.
    /// - [`MarketplaceError::Remote`]: any other non-2xx status.
    /// - [`MarketplaceError::Deserialize`]: 2xx body is not JSON.
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, MarketplaceError> {
        let url = self.endpoint(path)?;
        self.request_url(url, method, body).await
    }

    pub(crate) async fn request_url(
        &self,
        url: Url,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, MarketplaceError> {
        let token = self.credentials.resolve()?;
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| MarketplaceError::Deserialize {
                context: format!("request body for {url}"),
                source: e,
            })?;

        retry_with_backoff(self.retry, || {
            let url = url.clone();
            let method = method.clone();
            let token = token.clone();
            let payload = payload.clone();
            async move { self.send_once(url, method, &token, payload).await }
        })
        .await
    }

    async fn send_once(
        &self,
        url: Url,
        method: Method,
        token: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<Value, MarketplaceError> {
        let mut request = self
            .client
            .request(method, url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, token);
        if let Some(payload) = payload {
            request = request.body(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| MarketplaceError::Deserialize {
                context: url.to_string(),
                source: e,
            });
        }

        let body = truncate_body(&text);
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(MarketplaceError::Transient {
                status: status.as_u16(),
                body,
            });
        }

        tracing::warn!(status = status.as_u16(), %url, "marketplace rejected request");
        Err(MarketplaceError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    /// Resolves `path` against the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, MarketplaceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| MarketplaceError::InvalidUrl {
                url: path.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Appends raw path segments (percent-encoded as needed) to the base URL.
    pub(crate) fn segments_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
