//! Cluster event distribution.
//!
//! Nodes share one broadcast channel. Each node publishes through its own
//! [`NodeEventBus`] and replays events from its peers in a listener task. While
//! a peer event is being replayed, the node's bus reports
//! [`EventBus::is_replaying`] so that handlers do not publish the same change
//! back to the cluster.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::Error;
use crate::config::AppConfig;
use crate::status::{RemoteConnectionStatus, RemoteConnectionStatusType};

tokio::task_local! {
    /// Node id whose listener is replaying the current event.
    static REPLAYING_NODE: String;
}

/// A repository's caches were invalidated on the publishing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCacheInvalidationEvent {
    pub repository_name: String,
}

impl RepositoryCacheInvalidationEvent {
    pub fn new(repository_name: impl Into<String>) -> Self {
        Self { repository_name: repository_name.into() }
    }
}

/// A repository's remote connection status changed on the publishing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRemoteConnectionStatusEvent {
    pub repository_name: String,
    pub status_type: RemoteConnectionStatusType,
    pub reason: Option<String>,
    /// End of the block; the publish time when the status carried none.
    pub blocked_until: DateTime<Utc>,
    pub request_url: Option<String>,
}

impl RepositoryRemoteConnectionStatusEvent {
    pub fn new(repository_name: impl Into<String>, status: &RemoteConnectionStatus) -> Self {
        Self {
            repository_name: repository_name.into(),
            status_type: status.status_type,
            reason: status.reason.clone(),
            blocked_until: status.blocked_until.unwrap_or_else(Utc::now),
            request_url: status.request_url.clone(),
        }
    }

    /// Rebuild the status snapshot; only auto-blocked statuses keep their block end.
    pub fn status(&self) -> RemoteConnectionStatus {
        let blocked_until = match self.status_type {
            RemoteConnectionStatusType::AutoBlockedUnavailable => Some(self.blocked_until),
            _ => None,
        };
        RemoteConnectionStatus {
            status_type: self.status_type,
            reason: self.reason.clone(),
            blocked_until,
            request_url: self.request_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterEvent {
    RepositoryCacheInvalidation(RepositoryCacheInvalidationEvent),
    RepositoryRemoteConnectionStatus(RepositoryRemoteConnectionStatusEvent),
}

impl ClusterEvent {
    pub fn repository_name(&self) -> &str {
        match self {
            ClusterEvent::RepositoryCacheInvalidation(e) => &e.repository_name,
            ClusterEvent::RepositoryRemoteConnectionStatus(e) => &e.repository_name,
        }
    }
}

/// Event as carried on the shared channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: String,
    pub event: ClusterEvent,
    pub published_at: DateTime<Utc>,
}

/// Publishing side of the cluster bus, as seen by one node.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: ClusterEvent) -> Result<(), Error>;

    /// True while this node is applying an event received from a peer.
    fn is_replaying(&self) -> bool;
}

/// Applies events received from peers.
#[async_trait]
pub trait ClusterEventHandler: Send + Sync {
    async fn on_event(&self, event: &ClusterEvent) -> Result<(), Error>;
}

/// Shared channel connecting all nodes.
#[derive(Debug, Clone)]
pub struct ClusterBus {
    sender: broadcast::Sender<Envelope>,
}

impl ClusterBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.event_capacity)
    }

    /// Handle for the node identified by `node_id`.
    pub fn node(&self, node_id: impl Into<String>) -> NodeEventBus {
        NodeEventBus { node_id: node_id.into(), sender: self.sender.clone() }
    }
}

impl Default for ClusterBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// One node's handle on the cluster bus.
#[derive(Debug, Clone)]
pub struct NodeEventBus {
    node_id: String,
    sender: broadcast::Sender<Envelope>,
}

impl NodeEventBus {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Replay events published by other nodes through `handler`.
    ///
    /// The subscription is taken before this returns, so nothing published
    /// afterwards is missed. The task ends when the channel closes.
    pub fn spawn_listener(&self, handler: Arc<dyn ClusterEventHandler>) -> JoinHandle<()> {
        let mut receiver = self.sender.subscribe();
        let node_id = self.node_id.clone();

        tokio::spawn(async move {
            loop {
                let envelope = match receiver.recv().await {
                    Ok(envelope) => envelope,
                    // events older than the channel capacity are lost to a slow listener
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(node = %node_id, skipped, "cluster event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if envelope.origin == node_id {
                    continue;
                }

                tracing::debug!(
                    node = %node_id,
                    origin = %envelope.origin,
                    published_at = %envelope.published_at.to_rfc3339(),
                    repository = envelope.event.repository_name(),
                    "replaying cluster event"
                );

                let result = REPLAYING_NODE.scope(node_id.clone(), handler.on_event(&envelope.event)).await;
                if let Err(e) = result {
                    tracing::error!(node = %node_id, error = %e, "failed to replay cluster event");
                }
            }
            tracing::debug!(node = %node_id, "cluster event listener stopped");
        })
    }
}

impl EventBus for NodeEventBus {
    fn publish(&self, event: ClusterEvent) -> Result<(), Error> {
        let envelope = Envelope { origin: self.node_id.clone(), event, published_at: Utc::now() };

        // no receivers simply means no peers are listening yet
        if self.sender.send(envelope).is_err() {
            tracing::debug!(node = %self.node_id, "cluster event published without listeners");
        }
        Ok(())
    }

    fn is_replaying(&self) -> bool {
        REPLAYING_NODE
            .try_with(|node| *node == self.node_id)
            .unwrap_or(false)
    }
}
