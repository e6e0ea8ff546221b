//! HTTP transport
//!
//! Performs exactly one network call per `get` after waiting on the shared
//! [`RateLimiter`], and translates every failure into the crawl error
//! taxonomy. Retrying is left to the caller's [`crate::RetryPolicy`].

use crate::config::CrawlConfig;
use crate::crawler::rate_limit::RateLimiter;
use crate::error::{CrawlError, CrawlResult};
use crate::metrics::HttpRequestMetrics;
use reqwest::{Client, Proxy, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rate-limited HTTP client shared by every source on one quota
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpTransport {
    /// Create a transport
    ///
    /// # Arguments
    /// * `rate_limiter` - Shared limiter acquired before every request
    /// * `timeout` - Whole-request timeout
    /// * `proxy` - Optional proxy URL applied to all schemes
    ///
    /// # Errors
    /// [`CrawlError::Configuration`] for an invalid proxy or client setup
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> CrawlResult<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crawl-engine/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| CrawlError::Configuration(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| CrawlError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Create a transport from timeout and proxy settings
    pub fn from_config(config: &CrawlConfig, rate_limiter: Arc<RateLimiter>) -> CrawlResult<Self> {
        Self::new(rate_limiter, config.timeout(), config.proxy.as_deref())
    }

    /// Shared limiter
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// GET `url` with query parameters and decode the JSON body
    ///
    /// # Errors
    /// - [`CrawlError::Network`] for timeouts and connection failures
    /// - [`CrawlError::RateLimited`] for HTTP 429
    /// - [`CrawlError::Api`] for any other non-2xx status
    /// - [`CrawlError::Data`] if the body is not the expected JSON
    pub async fn get<T>(&self, url: &str, params: &[(String, String)]) -> CrawlResult<T>
    where
        T: DeserializeOwned,
    {
        self.rate_limiter.acquire().await;

        debug!(url = %url, params = params.len(), "Sending GET request");
        let request_metrics = HttpRequestMetrics::start(endpoint_label(url));

        let response = match self.client.get(url).query(params).send().await {
            Ok(response) => response,
            Err(e) => {
                request_metrics.record_network_error();
                return Err(map_transport_error(&e));
            }
        };

        let status = response.status();
        request_metrics.record_complete(status.as_u16());
        let body = read_body(response).await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CrawlError::RateLimited {
                message: format!("too many requests to {url}"),
                body: Some(body),
            });
        }
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unexpected status");
            return Err(CrawlError::http(status.as_u16(), reason, Some(body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| CrawlError::Data(format!("failed to decode response from {url}: {e}")))
    }
}

async fn read_body(response: Response) -> CrawlResult<String> {
    response.text().await.map_err(|e| map_transport_error(&e))
}

/// Translate a reqwest failure into the crawl taxonomy
fn map_transport_error(e: &reqwest::Error) -> CrawlError {
    if e.is_timeout() {
        CrawlError::Network(format!("request timeout: {e}"))
    } else if e.is_connect() {
        CrawlError::Network(format!("connection failed: {e}"))
    } else if e.is_decode() {
        CrawlError::Data(format!("failed to decode response: {e}"))
    } else if e.is_builder() {
        CrawlError::Configuration(format!("invalid request: {e}"))
    } else {
        CrawlError::Network(format!("request failed: {e}"))
    }
}

/// Path of `url` without query, used as a low-cardinality metrics label
fn endpoint_label(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}
