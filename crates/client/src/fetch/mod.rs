//! Network seam for the interception layer.
//!
//! Strategies talk to the origin through the [`Network`] trait so they can be
//! exercised without sockets. [`HttpNetwork`] is the reqwest-backed
//! implementation used in production.
//!
//! ### Failure model
//! - Transport failures (DNS, refused, offline) map to `Error::Network`
//! - Timeouts map to `Error::FetchTimeout`
//! - Any HTTP status, including 4xx/5xx, is a *successful* fetch; strategies
//!   decide what a non-2xx status means for caching

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, header};

pub use self::url::{UrlError, require_http, resolve};

use shellcache_core::{Error, RequestDescriptor, ResponseArtifact};

/// Something that can perform a real fetch for a request.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Fetch `request` from its origin.
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseArtifact, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shellcache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "shellcache/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&shellcache_core::AppConfig> for FetchConfig {
    fn from(config: &shellcache_core::AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed [`Network`].
pub struct HttpNetwork {
    http: Client,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

fn transport_error(request: &RequestDescriptor, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{request}: {err}"))
    } else {
        Error::Network(format!("{request}: {err}"))
    }
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseArtifact, Error> {
        let start = Instant::now();
        require_http(request.url()).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method(), e)))?;

        let mut builder = self.http.request(method, request.url().as_str());
        if let Some(accept) = request.accept() {
            builder = builder.header(header::ACCEPT, accept);
        }

        let response = builder.send().await.map_err(|e| transport_error(request, e))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|e| transport_error(request, e))?;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", request, status, start.elapsed().as_millis(), body.len());

        Ok(ResponseArtifact { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "shellcache/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = shellcache_core::AppConfig { user_agent: "test-agent".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_http_network_new() {
        let network = HttpNetwork::new(FetchConfig::default());
        assert!(network.is_ok());
    }

    #[tokio::test]
    async fn test_http_network_rejects_foreign_scheme() {
        let network = HttpNetwork::new(FetchConfig::default()).unwrap();
        let request = RequestDescriptor::get(::url::Url::parse("chrome-extension://abc/x.js").unwrap());
        let result = network.fetch(&request).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
