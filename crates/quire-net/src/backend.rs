//! Network backends.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{NetError, Request, Response};

/// Transport used by the fetch policy to reach the network.
///
/// An `Err` means no response was obtainable at all (offline, DNS failure,
/// connection refused, timeout). Status-level outcomes, including 4xx and
/// 5xx, are `Ok` responses.
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// HTTP backend configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Quire/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Production backend over a reqwest client.
pub struct HttpBackend {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpBackend {
    /// Create a backend with default configuration.
    pub fn new() -> Result<Self, NetError> {
        Self::with_config(HttpConfig::default())
    }

    /// Create a backend with custom configuration.
    pub fn with_config(config: HttpConfig) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NetworkBackend for HttpBackend {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let scheme = request.url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(NetError::UnsupportedScheme(scheme.to_string()));
        }

        debug!(method = %request.method, url = %request.url, "network fetch");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        builder = builder.header("Accept-Language", &self.config.accept_language);

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(self.config.timeout)
            } else {
                NetError::Transport(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        trace!(
            url = %request.url,
            status = %status,
            body_len = body.len(),
            "response received"
        );

        Ok(Response::new(status, headers, body))
    }
}
