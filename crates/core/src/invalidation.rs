//! Repository cache invalidation, locally and across the cluster.

use std::sync::Arc;

use crate::Error;
use crate::events::{ClusterEvent, EventBus, RepositoryCacheInvalidationEvent};
use crate::repository::{Repository, RepositoryKind, RepositoryRegistry};

/// Invalidates repository caches and keeps peer nodes in step.
pub struct CacheInvalidationCoordinator {
    registry: Arc<dyn RepositoryRegistry>,
    bus: Arc<dyn EventBus>,
}

impl CacheInvalidationCoordinator {
    pub fn new(registry: Arc<dyn RepositoryRegistry>, bus: Arc<dyn EventBus>) -> Self {
        Self { registry, bus }
    }

    /// Administrative entry point: invalidate locally and tell the cluster.
    pub async fn process_caches_invalidation(&self, repository: &Repository) -> Result<(), Error> {
        self.invalidate(repository, true).await
    }

    /// Invalidate the caches a repository's kind carries.
    ///
    /// Only locally triggered invalidations are published, and never while a
    /// peer event is being replayed.
    pub async fn invalidate(&self, repository: &Repository, triggered_locally: bool) -> Result<(), Error> {
        tracing::info!(
            repository = repository.name(),
            kind = repository.kind().name(),
            triggered_locally,
            "invalidating repository caches"
        );

        match repository.kind() {
            RepositoryKind::Group(group) => group.invalidate_aggregated_cache().await?,
            RepositoryKind::Proxy(facets) => {
                facets.proxy.invalidate_proxied_cache().await?;
                facets.negative_cache.invalidate().await?;
            }
            RepositoryKind::Hosted => {}
        }

        if triggered_locally && !self.bus.is_replaying() {
            tracing::debug!(repository = repository.name(), "distributing cache invalidation");
            self.bus.publish(ClusterEvent::RepositoryCacheInvalidation(RepositoryCacheInvalidationEvent::new(
                repository.name(),
            )))?;
        }

        Ok(())
    }

    /// Replay an invalidation received from a peer.
    ///
    /// Repositories unknown to this node are skipped.
    pub async fn on_invalidation_event(&self, event: &RepositoryCacheInvalidationEvent) -> Result<(), Error> {
        match self.lookup(&event.repository_name) {
            Ok(repository) => self.invalidate(&repository, false).await,
            Err(e) => {
                tracing::debug!(error = %e, "skipping invalidation");
                Ok(())
            }
        }
    }

    /// Administrative entry point by repository name.
    ///
    /// # Errors
    ///
    /// Returns `Error::RepositoryNotFound` if no repository has that name.
    pub async fn process_caches_invalidation_by_name(&self, name: &str) -> Result<(), Error> {
        let repository = self.lookup(name)?;
        self.process_caches_invalidation(&repository).await
    }

    fn lookup(&self, name: &str) -> Result<Arc<Repository>, Error> {
        self.registry.find_by_name(name).ok_or_else(|| Error::RepositoryNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{GroupFacet, NegativeCacheFacet, ProxyFacet, ProxyFacets, RepositoryManager};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counter {
        fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), fail: true }
        }

        fn hit(&self, facet: &str) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail { Err(Error::facet(facet, "unavailable")) } else { Ok(()) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GroupFacet for Counter {
        async fn invalidate_aggregated_cache(&self) -> Result<(), Error> {
            self.hit("group")
        }
    }

    #[async_trait]
    impl ProxyFacet for Counter {
        async fn invalidate_proxied_cache(&self) -> Result<(), Error> {
            self.hit("proxy")
        }
    }

    #[async_trait]
    impl NegativeCacheFacet for Counter {
        async fn invalidate(&self) -> Result<(), Error> {
            self.hit("negative-cache")
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<ClusterEvent>>,
        replaying: bool,
    }

    impl EventBus for RecordingBus {
        fn publish(&self, event: ClusterEvent) -> Result<(), Error> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        fn is_replaying(&self) -> bool {
            self.replaying
        }
    }

    struct Fixture {
        group: Arc<Counter>,
        proxy: Arc<Counter>,
        negative: Arc<Counter>,
        registry: Arc<RepositoryManager>,
    }

    fn fixture() -> Fixture {
        let group = Arc::new(Counter::default());
        let proxy = Arc::new(Counter::default());
        let negative = Arc::new(Counter::default());
        let registry = Arc::new(RepositoryManager::new());
        registry.add(Repository::new("npm-group", "npm", RepositoryKind::Group(group.clone()))).unwrap();
        registry
            .add(Repository::new(
                "npm-proxy",
                "npm",
                RepositoryKind::Proxy(ProxyFacets::new(proxy.clone(), negative.clone())),
            ))
            .unwrap();
        registry.add(Repository::new("npm-hosted", "npm", RepositoryKind::Hosted)).unwrap();
        Fixture { group, proxy, negative, registry }
    }

    fn coordinator(fixture: &Fixture, bus: Arc<RecordingBus>) -> CacheInvalidationCoordinator {
        CacheInvalidationCoordinator::new(fixture.registry.clone(), bus)
    }

    fn repository(fixture: &Fixture, name: &str) -> Arc<Repository> {
        fixture.registry.find_by_name(name).unwrap()
    }

    #[tokio::test]
    async fn test_group_touches_only_group_facet() {
        let fixture = fixture();
        let coordinator = coordinator(&fixture, Arc::new(RecordingBus::default()));

        coordinator.invalidate(&repository(&fixture, "npm-group"), false).await.unwrap();

        assert_eq!(fixture.group.calls(), 1);
        assert_eq!(fixture.proxy.calls(), 0);
        assert_eq!(fixture.negative.calls(), 0);
    }

    #[tokio::test]
    async fn test_proxy_touches_proxy_and_negative_cache() {
        let fixture = fixture();
        let coordinator = coordinator(&fixture, Arc::new(RecordingBus::default()));

        coordinator.invalidate(&repository(&fixture, "npm-proxy"), false).await.unwrap();

        assert_eq!(fixture.group.calls(), 0);
        assert_eq!(fixture.proxy.calls(), 1);
        assert_eq!(fixture.negative.calls(), 1);
    }

    #[tokio::test]
    async fn test_hosted_touches_nothing() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(&fixture, bus.clone());

        coordinator.invalidate(&repository(&fixture, "npm-hosted"), false).await.unwrap();

        assert_eq!(fixture.group.calls() + fixture.proxy.calls() + fixture.negative.calls(), 0);
        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_invalidation_publishes_once() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(&fixture, bus.clone());

        coordinator.process_caches_invalidation(&repository(&fixture, "npm-proxy")).await.unwrap();

        let published = bus.published.lock().unwrap();
        assert_eq!(
            *published,
            vec![ClusterEvent::RepositoryCacheInvalidation(RepositoryCacheInvalidationEvent::new("npm-proxy"))]
        );
    }

    #[tokio::test]
    async fn test_replayed_invalidation_publishes_nothing() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(&fixture, bus.clone());

        coordinator
            .on_invalidation_event(&RepositoryCacheInvalidationEvent::new("npm-proxy"))
            .await
            .unwrap();

        assert_eq!(fixture.proxy.calls(), 1);
        assert_eq!(fixture.negative.calls(), 1);
        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_invalidation_during_replay_publishes_nothing() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus { replaying: true, ..Default::default() });
        let coordinator = coordinator(&fixture, bus.clone());

        coordinator.invalidate(&repository(&fixture, "npm-group"), true).await.unwrap();

        assert_eq!(fixture.group.calls(), 1);
        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_repository_is_ignored() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(&fixture, bus.clone());

        coordinator
            .on_invalidation_event(&RepositoryCacheInvalidationEvent::new("gone"))
            .await
            .unwrap();

        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_by_name() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(&fixture, bus.clone());

        coordinator.process_caches_invalidation_by_name("npm-group").await.unwrap();
        assert_eq!(fixture.group.calls(), 1);

        let result = coordinator.process_caches_invalidation_by_name("gone").await;
        assert!(matches!(result, Err(Error::RepositoryNotFound(name)) if name == "gone"));
        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_invalidation_is_idempotent() {
        let fixture = fixture();
        let bus = Arc::new(RecordingBus::default());
        let coordinator = coordinator(&fixture, bus.clone());
        let repository = repository(&fixture, "npm-proxy");

        coordinator.process_caches_invalidation(&repository).await.unwrap();
        coordinator.process_caches_invalidation(&repository).await.unwrap();

        assert_eq!(fixture.proxy.calls(), 2);
        assert_eq!(bus.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_facet_errors_propagate() {
        let proxy = Arc::new(Counter::failing());
        let negative = Arc::new(Counter::default());
        let registry = Arc::new(RepositoryManager::new());
        let bus = Arc::new(RecordingBus::default());
        let coordinator = CacheInvalidationCoordinator::new(registry, bus.clone());
        let repository =
            Repository::new("npm-proxy", "npm", RepositoryKind::Proxy(ProxyFacets::new(proxy.clone(), negative.clone())));

        let result = coordinator.process_caches_invalidation(&repository).await;

        assert!(matches!(result, Err(Error::FacetFailed { facet, .. }) if facet == "proxy"));
        assert_eq!(negative.calls(), 0);
        assert!(bus.published.lock().unwrap().is_empty());
    }
}
