//! Negative cache of "not found upstream" results.
//!
//! Remembers paths the remote confirmed absent so repeated misses are
//! answered locally until the TTL elapses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::repository::NegativeCacheFacet;

/// A recorded miss with its timestamp.
struct CachedMiss {
    recorded_at: Instant,
}

impl CachedMiss {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.recorded_at.elapsed() > ttl
    }
}

/// In-memory negative cache keyed by request path.
pub struct NegativeCache {
    entries: Arc<RwLock<HashMap<String, CachedMiss>>>,
    ttl: Duration,
}

impl NegativeCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record that `path` was not found upstream, dropping expired misses.
    pub async fn put(&self, path: &str) {
        let ttl = self.ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, miss| !miss.is_expired(ttl));
        entries.insert(path.to_string(), CachedMiss { recorded_at: Instant::now() });
    }

    /// True while an unexpired miss is recorded for `path`.
    pub async fn contains(&self, path: &str) -> bool {
        let entries = self.entries.read().await;
        entries.get(path).is_some_and(|miss| !miss.is_expired(self.ttl))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries.
    pub async fn cleanup_expired(&self) {
        let ttl = self.ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, miss| !miss.is_expired(ttl));
    }
}

#[async_trait]
impl NegativeCacheFacet for NegativeCache {
    async fn invalidate(&self) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        let cleared = entries.len();
        entries.clear();
        tracing::debug!(cleared, "negative cache invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60 * 60);

    #[tokio::test]
    async fn test_put_and_contains() {
        let cache = NegativeCache::new(TTL);
        assert!(!cache.contains("/lodash").await);

        cache.put("/lodash").await;
        assert!(cache.contains("/lodash").await);
        assert!(!cache.contains("/react").await);
    }

    #[test]
    fn test_cached_miss_expiry() {
        let miss = CachedMiss { recorded_at: Instant::now() };
        assert!(!miss.is_expired(TTL));

        std::thread::sleep(Duration::from_millis(5));
        assert!(miss.is_expired(Duration::from_millis(1)));
    }

    #[tokio::test]
    async fn test_expired_entries() {
        let cache = NegativeCache::new(Duration::from_millis(50));
        cache.put("/stale").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cache.contains("/stale").await);

        cache.cleanup_expired().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_prunes_expired_misses() {
        let cache = NegativeCache::new(Duration::from_millis(50));
        cache.put("/stale").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        cache.put("/fresh").await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.contains("/fresh").await);
    }

    #[tokio::test]
    async fn test_invalidate_clears_everything() {
        let cache = NegativeCache::new(TTL);
        cache.put("/a").await;
        cache.put("/b").await;

        cache.invalidate().await.unwrap();
        assert!(cache.is_empty().await);

        // nothing cached: still fine
        cache.invalidate().await.unwrap();
    }
}
