//! Logs remote status transitions and shares them with peer nodes.

use std::sync::Arc;

use upguard_core::events::{ClusterEvent, EventBus, RepositoryRemoteConnectionStatusEvent};
use upguard_core::{RemoteConnectionStatus, RemoteConnectionStatusObserver, RemoteConnectionStatusType};

/// Status observer installed for a proxy repository's client.
pub struct RemoteStatusLogger {
    repository: String,
    bus: Option<Arc<dyn EventBus>>,
}

impl RemoteStatusLogger {
    pub fn new(repository: impl Into<String>) -> Self {
        Self { repository: repository.into(), bus: None }
    }

    /// Publish transitions to the cluster through `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn log_change(&self, old: &RemoteConnectionStatus, new: &RemoteConnectionStatus) {
        use RemoteConnectionStatusType::*;

        match (old.status_type, new.status_type) {
            (AutoBlockedUnavailable, AutoBlockedUnavailable) => tracing::info!(
                repository = %self.repository,
                status = %new.status_type,
                "Repository status for {} continued as {} until {} - reason {} (previous reason was {})",
                self.repository,
                new.status_type,
                until(new),
                reason(new),
                reason(old)
            ),
            (Uninitialised, _) => tracing::info!(
                repository = %self.repository,
                status = %new.status_type,
                "Remote connection status of repository {} set to {}",
                self.repository,
                new.description()
            ),
            _ => tracing::info!(
                repository = %self.repository,
                from = %old.status_type,
                to = %new.status_type,
                "Repository status for {} changed from {} to {}{} - reason {}",
                self.repository,
                old.status_type,
                new.status_type,
                new.blocked_until.map(|t| format!(" until {}", t.to_rfc3339())).unwrap_or_default(),
                reason(new)
            ),
        }
    }

    fn distribute(&self, old: &RemoteConnectionStatus, new: &RemoteConnectionStatus) {
        let Some(bus) = &self.bus else {
            return;
        };
        // the initial status is local to this node
        if old.status_type == RemoteConnectionStatusType::Uninitialised {
            return;
        }
        if bus.is_replaying() {
            tracing::debug!(repository = %self.repository, "status change originally triggered by remote event");
            return;
        }

        tracing::debug!(repository = %self.repository, status = %new.status_type, "distributing remote status change");
        let event = RepositoryRemoteConnectionStatusEvent::new(self.repository.clone(), new);
        if let Err(e) = bus.publish(ClusterEvent::RepositoryRemoteConnectionStatus(event)) {
            tracing::warn!(repository = %self.repository, error = %e, "failed to distribute remote status change");
        }
    }
}

impl RemoteConnectionStatusObserver for RemoteStatusLogger {
    fn on_status_changed(&self, old: &RemoteConnectionStatus, new: &RemoteConnectionStatus) {
        self.log_change(old, new);
        self.distribute(old, new);
    }
}

fn until(status: &RemoteConnectionStatus) -> String {
    status.blocked_until.map(|t| t.to_rfc3339()).unwrap_or_else(|| "n/a".to_string())
}

fn reason(status: &RemoteConnectionStatus) -> String {
    format!(
        "{} for {}",
        status.reason.as_deref().unwrap_or("n/a"),
        status.request_url.as_deref().unwrap_or("n/a")
    )
}
