//! Core types and shared functionality for upguard.
//!
//! This crate provides:
//! - Cache freshness records and controllers for proxy and group repositories
//! - Remote connection status types
//! - Repository cache invalidation with cluster replication
//! - Configuration structures and unified error types

pub mod attributes;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod replication;
pub mod repository;
pub mod status;

pub use attributes::AttributesMap;
pub use cache::{CacheController, CacheControllerHolder, CacheInfo, CacheType};
pub use config::{AppConfig, AutoBlockConfig, ConfigError};
pub use error::Error;
pub use events::{ClusterBus, ClusterEvent, EventBus, NodeEventBus};
pub use invalidation::CacheInvalidationCoordinator;
pub use replication::ClusterEventDispatcher;
pub use repository::{HttpClientFacet, Repository, RepositoryKind, RepositoryManager, RepositoryRegistry};
pub use status::{RemoteConnectionStatus, RemoteConnectionStatusObserver, RemoteConnectionStatusType};
