//! Repository model and the facets cache invalidation acts on.
//!
//! A repository's kind determines which facets it carries: groups aggregate
//! members behind a merged cache, proxies cache a remote (content plus
//! negative cache) and hosted repositories cache nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::Error;
use crate::status::RemoteConnectionStatus;

/// Aggregated cache of a group repository.
#[async_trait]
pub trait GroupFacet: Send + Sync {
    async fn invalidate_aggregated_cache(&self) -> Result<(), Error>;
}

/// Content cache of a proxy repository.
#[async_trait]
pub trait ProxyFacet: Send + Sync {
    async fn invalidate_proxied_cache(&self) -> Result<(), Error>;
}

/// Cache of paths confirmed absent upstream.
#[async_trait]
pub trait NegativeCacheFacet: Send + Sync {
    async fn invalidate(&self) -> Result<(), Error>;
}

/// Remote connection status of a proxy's HTTP client.
pub trait HttpClientFacet: Send + Sync {
    fn status(&self) -> RemoteConnectionStatus;

    /// Replace the status, typically with one replicated from a peer node.
    fn set_status(&self, status: RemoteConnectionStatus);
}

/// Facets carried by a proxy repository.
#[derive(Clone)]
pub struct ProxyFacets {
    pub proxy: Arc<dyn ProxyFacet>,
    pub negative_cache: Arc<dyn NegativeCacheFacet>,
    pub http_client: Option<Arc<dyn HttpClientFacet>>,
}

impl ProxyFacets {
    pub fn new(proxy: Arc<dyn ProxyFacet>, negative_cache: Arc<dyn NegativeCacheFacet>) -> Self {
        Self { proxy, negative_cache, http_client: None }
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClientFacet>) -> Self {
        self.http_client = Some(http_client);
        self
    }
}

#[derive(Clone)]
pub enum RepositoryKind {
    Group(Arc<dyn GroupFacet>),
    Proxy(ProxyFacets),
    Hosted,
}

impl RepositoryKind {
    pub fn name(&self) -> &'static str {
        match self {
            RepositoryKind::Group(_) => "group",
            RepositoryKind::Proxy(_) => "proxy",
            RepositoryKind::Hosted => "hosted",
        }
    }
}

pub struct Repository {
    name: String,
    format: String,
    kind: RepositoryKind,
}

impl Repository {
    pub fn new(name: impl Into<String>, format: impl Into<String>, kind: RepositoryKind) -> Self {
        Self { name: name.into(), format: format.into(), kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn kind(&self) -> &RepositoryKind {
        &self.kind
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("kind", &self.kind.name())
            .finish()
    }
}

/// Resolves repositories by name.
pub trait RepositoryRegistry: Send + Sync {
    fn find_by_name(&self, name: &str) -> Option<Arc<Repository>>;
}

/// In-memory repository registry.
#[derive(Default)]
pub struct RepositoryManager {
    repositories: RwLock<HashMap<String, Arc<Repository>>>,
}

impl RepositoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository, replacing any previous one of the same name.
    pub fn add(&self, repository: Repository) -> Result<Arc<Repository>, Error> {
        if repository.name().trim().is_empty() {
            return Err(Error::InvalidInput("repository name must not be empty".into()));
        }
        let repository = Arc::new(repository);
        let mut repositories = self.repositories.write().unwrap_or_else(|e| e.into_inner());
        repositories.insert(repository.name().to_string(), Arc::clone(&repository));
        Ok(repository)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Repository>> {
        self.repositories.write().unwrap_or_else(|e| e.into_inner()).remove(name)
    }

    pub fn len(&self) -> usize {
        self.repositories.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RepositoryRegistry for RepositoryManager {
    fn find_by_name(&self, name: &str) -> Option<Arc<Repository>> {
        self.repositories.read().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }
}
