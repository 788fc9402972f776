//! Proxy and group facet implementations built on cache controllers.

use async_trait::async_trait;

use super::controller::{CacheController, CacheControllerHolder, CacheType};
use super::info::CacheInfo;
use crate::Error;
use crate::attributes::AttributesMap;
use crate::config::AppConfig;
use crate::repository::{GroupFacet, ProxyFacet};

/// Content cache of a proxy repository.
#[derive(Debug)]
pub struct ProxyCache {
    repository: String,
    controllers: CacheControllerHolder,
}

impl ProxyCache {
    pub fn new(repository: impl Into<String>, controllers: CacheControllerHolder) -> Self {
        Self { repository: repository.into(), controllers }
    }

    pub fn from_config(repository: impl Into<String>, config: &AppConfig) -> Self {
        let controllers = CacheControllerHolder::new(
            CacheController::new(config.content_max_age(), None),
            CacheController::new(config.metadata_max_age(), None),
        );
        Self::new(repository, controllers)
    }

    pub fn controllers(&self) -> &CacheControllerHolder {
        &self.controllers
    }

    /// Whether cached content must be re-fetched before being served.
    ///
    /// Missing content, or content without a cache record, is always stale.
    pub fn is_stale(&self, cache_type: CacheType, attributes: Option<&AttributesMap>) -> bool {
        let Some(attributes) = attributes else {
            return true;
        };

        match CacheInfo::extract_from(attributes) {
            Some(info) => self.controllers.get(cache_type).is_stale(&info),
            None => {
                tracing::warn!(repository = %self.repository, "cache info missing, assuming stale content");
                true
            }
        }
    }

    /// Stamp content as verified upstream just now, under the current token.
    pub fn indicate_verified(&self, cache_type: CacheType, attributes: &mut AttributesMap) -> CacheInfo {
        let info = self.controllers.get(cache_type).current();
        info.apply_to(attributes);
        info
    }
}

#[async_trait]
impl ProxyFacet for ProxyCache {
    async fn invalidate_proxied_cache(&self) -> Result<(), Error> {
        tracing::info!(repository = %self.repository, "invalidating proxy caches");
        self.controllers.invalidate_caches();
        Ok(())
    }
}

/// Aggregated (merged member) cache of a group repository.
#[derive(Debug)]
pub struct GroupCache {
    repository: String,
    controller: CacheController,
}

impl GroupCache {
    pub fn new(repository: impl Into<String>, controller: CacheController) -> Self {
        Self { repository: repository.into(), controller }
    }

    pub fn from_config(repository: impl Into<String>, config: &AppConfig) -> Self {
        Self::new(repository, CacheController::new(config.metadata_max_age(), None))
    }

    pub fn controller(&self) -> &CacheController {
        &self.controller
    }

    pub fn is_stale(&self, attributes: &AttributesMap) -> bool {
        CacheInfo::extract_from(attributes).is_none_or(|info| self.controller.is_stale(&info))
    }

    pub fn indicate_verified(&self, attributes: &mut AttributesMap) -> CacheInfo {
        let info = self.controller.current();
        info.apply_to(attributes);
        info
    }
}

#[async_trait]
impl GroupFacet for GroupCache {
    async fn invalidate_aggregated_cache(&self) -> Result<(), Error> {
        tracing::info!(repository = %self.repository, "invalidating group caches");
        self.controller.invalidate_cache();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_content_is_stale() {
        let cache = ProxyCache::from_config("npm-proxy", &AppConfig::default());
        assert!(cache.is_stale(CacheType::Content, None));
        assert!(cache.is_stale(CacheType::Content, Some(&AttributesMap::new())));
    }

    #[test]
    fn test_verified_content_is_fresh() {
        let cache = ProxyCache::from_config("npm-proxy", &AppConfig::default());
        let mut attributes = AttributesMap::new();
        cache.indicate_verified(CacheType::Content, &mut attributes);
        assert!(!cache.is_stale(CacheType::Content, Some(&attributes)));
    }

    #[tokio::test]
    async fn test_invalidate_proxied_cache() {
        let cache = ProxyCache::from_config("npm-proxy", &AppConfig::default());
        let mut content = AttributesMap::new();
        let mut metadata = AttributesMap::new();
        cache.indicate_verified(CacheType::Content, &mut content);
        cache.indicate_verified(CacheType::Metadata, &mut metadata);

        cache.invalidate_proxied_cache().await.unwrap();

        assert!(cache.is_stale(CacheType::Content, Some(&content)));
        assert!(cache.is_stale(CacheType::Metadata, Some(&metadata)));
    }

    #[tokio::test]
    async fn test_invalidate_aggregated_cache() {
        let cache = GroupCache::from_config("npm-group", &AppConfig::default());
        let mut merged = AttributesMap::new();
        cache.indicate_verified(&mut merged);
        assert!(!cache.is_stale(&merged));

        cache.invalidate_aggregated_cache().await.unwrap();
        assert!(cache.is_stale(&merged));
    }
}
