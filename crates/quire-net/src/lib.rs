//! # Quire Net
//!
//! Request/response model and network backends for the quire offline
//! runtime.
//!
//! ## Design Goals
//!
//! 1. **Explicit requests**: carry the navigation-mode flag the fetch
//!    policy branches on
//! 2. **Injectable transport**: the [`NetworkBackend`] trait separates the
//!    policy from the wire, so tests run against scripted backends
//! 3. **Failure = no response**: a 404 is a response; only transport-level
//!    failures (offline, DNS, refused, timeout) are errors

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

use thiserror::Error;

pub mod backend;

pub use backend::{HttpBackend, HttpConfig, NetworkBackend};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Whether a request loads a full page or a sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// A full-page navigation.
    Navigate,
    /// A sub-resource fetch (stylesheet, script, image, API call).
    #[default]
    SubResource,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub mode: RequestMode,
}

impl Request {
    /// Create a request with an explicit method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            mode: RequestMode::SubResource,
        }
    }

    /// Create a GET request for a sub-resource.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a GET request in navigation mode.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::new(Method::GET, url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check whether this is a navigation request.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whether this response was served from a cache bucket.
    pub from_cache: bool,
}

impl Response {
    /// Create a live network response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            from_cache: false,
        }
    }

    /// Check if the status indicates success (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Take the copy that outlives handing the original back to a caller.
    ///
    /// A browser response body is a single-consumption stream, so the copy
    /// destined for the cache has to be taken before the original is
    /// returned. Bodies here are immutable byte buffers, which makes the
    /// copy cheap, but the call site still marks the point where the
    /// duplicate must exist.
    pub fn duplicate(&self) -> Response {
        self.clone()
    }
}
