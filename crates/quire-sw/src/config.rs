//! Offline controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while resolving a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid origin {origin:?}: {source}")]
    InvalidOrigin {
        origin: String,
        source: url::ParseError,
    },

    #[error("Asset path {asset:?} does not resolve against the origin: {source}")]
    InvalidAsset {
        asset: String,
        source: url::ParseError,
    },
}

/// Deploy-time configuration of the offline cache controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Bucket generation name. Bumping this on deploy invalidates every
    /// prior generation's entries during the next activation.
    pub generation: String,

    /// Origin the controller runs against; seed assets and the offline
    /// fallback resolve relative to it.
    pub origin: String,

    /// Paths warmed into the bucket at install time. Must match the
    /// deployed static paths exactly.
    pub seed_assets: Vec<String>,

    /// Path segment that marks cacheable built assets; everything else is
    /// dynamic and never cached from live traffic.
    pub static_segment: String,

    /// Path of the document served to offline navigations.
    pub offline_fallback: String,

    /// Upper bound on the network attempt in the fetch policy, in
    /// milliseconds. Expiry counts as network failure and falls back to
    /// cache. `None` leaves the attempt unbounded.
    pub network_timeout_ms: Option<u64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            generation: "quire-v1".to_string(),
            origin: "https://shop.quire.example".to_string(),
            seed_assets: vec![
                "/".to_string(),
                "/static/css/store.css".to_string(),
                "/static/js/store.js".to_string(),
                "/static/images/logo.png".to_string(),
            ],
            static_segment: "/static/".to_string(),
            offline_fallback: "/".to_string(),
            network_timeout_ms: Some(10_000),
        }
    }
}

impl ControllerConfig {
    /// The parsed origin.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|source| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            source,
        })
    }

    /// Seed asset paths resolved to absolute URLs.
    pub fn seed_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let origin = self.origin_url()?;
        self.seed_assets
            .iter()
            .map(|asset| {
                origin.join(asset).map_err(|source| ConfigError::InvalidAsset {
                    asset: asset.clone(),
                    source,
                })
            })
            .collect()
    }

    /// The offline fallback document resolved to an absolute URL.
    pub fn fallback_url(&self) -> Result<Url, ConfigError> {
        let origin = self.origin_url()?;
        origin
            .join(&self.offline_fallback)
            .map_err(|source| ConfigError::InvalidAsset {
                asset: self.offline_fallback.clone(),
                source,
            })
    }

    /// The fetch-policy network bound, if one is configured.
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_resolves() {
        let config = ControllerConfig::default();

        let seeds = config.seed_urls().unwrap();
        assert_eq!(seeds.len(), 4);
        assert_eq!(seeds[0].as_str(), "https://shop.quire.example/");
        assert_eq!(
            seeds[1].as_str(),
            "https://shop.quire.example/static/css/store.css"
        );

        assert_eq!(
            config.fallback_url().unwrap().as_str(),
            "https://shop.quire.example/"
        );
        assert_eq!(config.network_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_invalid_origin() {
        let config = ControllerConfig {
            origin: "not a url".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            config.seed_urls(),
            Err(ConfigError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn test_unbounded_timeout() {
        let config = ControllerConfig {
            network_timeout_ms: None,
            ..Default::default()
        };
        assert_eq!(config.network_timeout(), None);
    }
}
