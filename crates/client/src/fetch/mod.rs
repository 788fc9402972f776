//! HTTP execution against a proxy repository's remote.
//!
//! ### Requests
//! - URLs are canonicalized (default `https`, lowercase host, no fragment)
//! - Each request is sent to a [`Target`]: the scheme, host and port it reaches
//!
//! ### Delegates
//! - [`HttpDelegate`] is the seam the circuit breaker wraps
//! - [`FetchClient`] is the production delegate over `reqwest`
//! - Max redirects: 5 (configurable)
//!
//! Non-success statuses are returned as responses; only transport failures
//! are errors.

pub mod target;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use std::time::{Duration, Instant};

pub use target::{Target, UrlError, canonicalize};

use crate::error::NetworkError;
use upguard_core::AppConfig;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "upguard/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "upguard/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// Request handed to a delegate.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new() }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Header-only request, as used for existence probes.
    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Build a request from a URL string, canonicalizing it first.
    pub fn parse(method: Method, url: &str) -> Result<Self, UrlError> {
        Ok(Self::new(method, canonicalize(url)?))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Target this request reaches.
    pub fn target(&self) -> Result<Target, UrlError> {
        Target::from_url(&self.url)
    }
}

/// Response from a delegate.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes (empty for HEAD)
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl HttpResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Executes requests against a remote.
#[async_trait]
pub trait HttpDelegate: Send + Sync {
    async fn execute(&self, target: &Target, request: HttpRequest) -> Result<HttpResponse, NetworkError>;

    /// Release pooled resources.
    fn close(&self) {}
}

/// HTTP delegate backed by `reqwest`.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, NetworkError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, NetworkError> {
        Self::new(FetchConfig::from(config))
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl HttpDelegate for FetchClient {
    async fn execute(&self, target: &Target, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let start = Instant::now();
        let HttpRequest { method, url, headers } = request;

        let response = self.http.request(method.clone(), url.clone()).headers(headers).send().await?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            remote = %target,
            method = %method,
            status = status.as_u16(),
            "fetched {} -> {} in {}ms ({} bytes)",
            url,
            final_url,
            fetch_ms,
            bytes.len()
        );

        Ok(HttpResponse { final_url, status, headers, bytes, fetch_ms })
    }

    fn close(&self) {
        tracing::debug!(user_agent = %self.config.user_agent, "closing fetch client");
    }
}
