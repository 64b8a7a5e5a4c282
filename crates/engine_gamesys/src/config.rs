//! Subsystem configuration.
//!
//! The values come from the project settings document, a JSON object with one
//! section per component kind:
//!
//! ```json
//! {
//!     "collection_proxy": { "max_count": 8 },
//!     "collectionfactory": { "max_count": 128 },
//!     "preloader": { "budget_ms": 10 }
//! }
//! ```
//!
//! Missing sections and keys fall back to their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Config key naming the proxy world capacity.
pub const COLLECTION_PROXY_MAX_COUNT_KEY: &str = "collection_proxy.max_count";

/// Config key naming the factory world capacity.
pub const COLLECTION_FACTORY_MAX_COUNT_KEY: &str = "collectionfactory.max_count";

/// `collection_proxy` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Maximum number of proxies per collection.
    pub max_count: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { max_count: 8 }
    }
}

/// `collectionfactory` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Maximum number of collection factories per collection.
    pub max_count: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self { max_count: 128 }
    }
}

/// `preloader` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloaderConfig {
    /// Time each in-flight preloader may spend per tick, in milliseconds.
    pub budget_ms: u64,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self { budget_ms: 10 }
    }
}

/// Configuration for the collection proxy and collection factory worlds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesysConfig {
    /// Proxy world settings.
    pub collection_proxy: ProxyConfig,
    /// Factory world settings.
    pub collectionfactory: FactoryConfig,
    /// Preloader settings.
    pub preloader: PreloaderConfig,
}

impl GamesysConfig {
    /// Parse a project settings document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the proxy world capacity.
    #[must_use]
    pub fn with_max_proxies(mut self, max_count: usize) -> Self {
        self.collection_proxy.max_count = max_count;
        self
    }

    /// Set the factory world capacity.
    #[must_use]
    pub fn with_max_factories(mut self, max_count: usize) -> Self {
        self.collectionfactory.max_count = max_count;
        self
    }

    /// Set the per-tick preload budget.
    #[must_use]
    pub fn with_preload_budget(mut self, budget: Duration) -> Self {
        self.preloader.budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The per-tick preload budget.
    #[must_use]
    pub fn preload_budget(&self) -> Duration {
        Duration::from_millis(self.preloader.budget_ms)
    }

    /// Capacity of a world: the configured limit, lowered to the collection's
    /// own component limit when it sets one.
    #[must_use]
    pub fn world_capacity(limit: usize, collection_max: Option<u32>) -> usize {
        match collection_max {
            Some(max) => limit.min(max as usize),
            None => limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GamesysConfig::default();
        assert_eq!(config.collection_proxy.max_count, 8);
        assert_eq!(config.collectionfactory.max_count, 128);
        assert_eq!(config.preload_budget(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_document() {
        let config = GamesysConfig::from_json(r#"{ "collection_proxy": { "max_count": 2 } }"#).unwrap();
        assert_eq!(config.collection_proxy.max_count, 2);
        assert_eq!(config.collectionfactory.max_count, 128);
    }

    #[test]
    fn test_builders() {
        let config = GamesysConfig::default()
            .with_max_proxies(1)
            .with_max_factories(3)
            .with_preload_budget(Duration::from_millis(4));
        assert_eq!(config.collection_proxy.max_count, 1);
        assert_eq!(config.collectionfactory.max_count, 3);
        assert_eq!(config.preloader.budget_ms, 4);
    }

    #[test]
    fn test_world_capacity_takes_minimum() {
        assert_eq!(GamesysConfig::world_capacity(8, None), 8);
        assert_eq!(GamesysConfig::world_capacity(8, Some(3)), 3);
        assert_eq!(GamesysConfig::world_capacity(8, Some(100)), 8);
    }
}
