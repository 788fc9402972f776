//! Unified error types for upguard.
//!
//! Display strings carry an upper-case code prefix so log lines and
//! administrative responses can be matched without parsing the message.

/// Unified error type for cache, repository and event operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty repository name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A repository facet failed while invalidating its cache.
    #[error("FACET_FAILED: {facet}: {message}")]
    FacetFailed { facet: String, message: String },

    /// Cluster event could not be published.
    #[error("EVENT_BUS: {0}")]
    EventBus(String),

    /// No repository registered under the given name.
    #[error("REPOSITORY_NOT_FOUND: {0}")]
    RepositoryNotFound(String),
}

impl Error {
    /// Shorthand for a facet failure.
    pub fn facet(facet: impl Into<String>, message: impl Into<String>) -> Self {
        Error::FacetFailed { facet: facet.into(), message: message.into() }
    }
}
