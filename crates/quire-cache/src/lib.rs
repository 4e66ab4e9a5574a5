//! # Quire Cache
//!
//! Versioned request/response cache buckets for the quire offline runtime.
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage (origin-scoped)
//!     │
//!     ├── bucket "quire-v1"          ← generation name
//!     │       └── RequestKey → CacheEntry
//!     └── bucket "quire-v2"
//!             └── RequestKey → CacheEntry
//! ```
//!
//! Storage is handed to the controller as an explicit [`CacheStorage`]
//! handle rather than looked up through a global, so tests inject
//! [`MemoryStorage`] and production hosts can supply a persistent backend.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use quire_net::{Request, Response};

pub mod memory;

pub use memory::MemoryStorage;

/// Errors that can occur in cache storage operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No such bucket: {0}")]
    BucketMissing(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Request identity used as the cache key: method plus full URL.
///
/// Headers do not participate; the controller only stores GETs and static
/// assets do not vary by header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    /// Key for a GET of the given URL.
    pub fn get(url: &Url) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.to_string(),
        }
    }

    /// Key identifying the given request.
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method.as_str().to_string(),
            url: request.url.to_string(),
        }
    }

    /// The keyed URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A stored response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at: u64,
}

impl CacheEntry {
    /// Capture a response into a storable entry.
    ///
    /// Headers with non-UTF-8 values are dropped; stored static assets do
    /// not carry any.
    pub fn from_response(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            stored_at: now_millis(),
        }
    }

    /// Rebuild a response from this entry, marked as cache-served.
    pub fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        Response {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body.into(),
            from_cache: true,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Origin-scoped storage of named cache buckets.
///
/// All operations are safe for concurrent use; in-flight fetch
/// interceptions share a single handle.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if absent.
    async fn open(&self, bucket: &str) -> Result<(), CacheError>;

    /// Check whether a bucket exists.
    async fn has(&self, bucket: &str) -> Result<bool, CacheError>;

    /// Store an entry under a key. The bucket must exist.
    async fn put(
        &self,
        bucket: &str,
        key: RequestKey,
        entry: CacheEntry,
    ) -> Result<(), CacheError>;

    /// Look up the entry for a key.
    async fn match_entry(
        &self,
        bucket: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, CacheError>;

    /// Delete a bucket and everything in it. Returns whether it existed.
    async fn delete(&self, bucket: &str) -> Result<bool, CacheError>;

    /// All bucket names known to this origin.
    async fn names(&self) -> Result<Vec<String>, CacheError>;
}
