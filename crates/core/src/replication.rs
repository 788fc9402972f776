//! Applies cluster events received from peer nodes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;
use crate::events::{ClusterEvent, ClusterEventHandler, RepositoryRemoteConnectionStatusEvent};
use crate::invalidation::CacheInvalidationCoordinator;
use crate::repository::{RepositoryKind, RepositoryRegistry};

/// Routes peer events to the local coordinator and repositories.
pub struct ClusterEventDispatcher {
    coordinator: Arc<CacheInvalidationCoordinator>,
    registry: Arc<dyn RepositoryRegistry>,
}

impl ClusterEventDispatcher {
    pub fn new(coordinator: Arc<CacheInvalidationCoordinator>, registry: Arc<dyn RepositoryRegistry>) -> Self {
        Self { coordinator, registry }
    }

    fn apply_remote_status(&self, event: &RepositoryRemoteConnectionStatusEvent) {
        let Some(repository) = self.registry.find_by_name(&event.repository_name) else {
            tracing::debug!(repository = %event.repository_name, "skipping status of unknown repository");
            return;
        };

        match repository.kind() {
            RepositoryKind::Proxy(facets) => match &facets.http_client {
                Some(http_client) => {
                    tracing::debug!(
                        repository = %event.repository_name,
                        status = %event.status_type,
                        "applying replicated remote connection status"
                    );
                    http_client.set_status(event.status());
                }
                None => tracing::debug!(repository = %event.repository_name, "proxy has no http client"),
            },
            kind => tracing::debug!(
                repository = %event.repository_name,
                kind = kind.name(),
                "ignoring remote status for non-proxy repository"
            ),
        }
    }
}

#[async_trait]
impl ClusterEventHandler for ClusterEventDispatcher {
    async fn on_event(&self, event: &ClusterEvent) -> Result<(), Error> {
        match event {
            ClusterEvent::RepositoryCacheInvalidation(e) => self.coordinator.on_invalidation_event(e).await,
            ClusterEvent::RepositoryRemoteConnectionStatus(e) => {
                self.apply_remote_status(e);
                Ok(())
            }
        }
    }
}
